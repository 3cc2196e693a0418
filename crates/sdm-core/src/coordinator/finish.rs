//! End states: verify and rename on completion, clean up on cancel, and the
//! optional hand-off to a storage provider.

use super::Coordinator;
use crate::checksum;
use crate::error::EngineError;
use crate::events::DownloadEvent;
use crate::model::DownloadStatus;
use crate::resume_store::{unix_timestamp, HistoryEntry};
use crate::storage::{self, StorageWriter};

impl Coordinator {
    /// Every segment is done: check the byte count (and digest), then rename
    /// `.part` into place. Segments were written by offset, so no merge pass.
    pub(super) async fn finish(&mut self, storage: StorageWriter) {
        self.storage = None;
        if let Err(e) = self.verify_and_finalize(storage).await {
            tracing::warn!(id = self.state.id, "finalize failed: {}", e);
            self.record_failure(&e).await;
            return;
        }
        self.record_history().await;
        self.set_status(DownloadStatus::Completed).await;
        self.upload_if_requested().await;
    }

    async fn record_history(&self) {
        let secs = self.active.as_secs_f64();
        let entry = HistoryEntry {
            id: self.state.id,
            url: self.state.request.url.clone(),
            path: self.state.final_path().to_path_buf(),
            total_bytes: self.state.bytes_done(),
            avg_bytes_per_sec: if secs > 0.0 { self.fetched as f64 / secs } else { 0.0 },
            started_at: self.state.created_at,
            finished_at: unix_timestamp(),
        };
        if let Err(e) = self.ctx.store.record_history(&entry).await {
            tracing::warn!(id = self.state.id, "recording history failed: {:#}", e);
        }
    }

    async fn verify_and_finalize(&mut self, storage: StorageWriter) -> Result<(), EngineError> {
        let written = self.state.bytes_done();
        let known = self.state.total_size();
        let expected = known.unwrap_or(written);
        if written != expected {
            return Err(EngineError::IncompleteOutput { expected, written });
        }
        if known.is_none() {
            // Lengthless body: drop any stale tail from an earlier attempt.
            storage.truncate(written)?;
            if let Some(meta) = self.state.metadata.as_mut() {
                meta.total_size = Some(written);
            }
        }
        storage.sync()?;

        if let Some(expected) = self.state.request.sha256.clone() {
            let actual = checksum::sha256_file(storage.temp_path().to_path_buf()).await?;
            if !checksum::digest_matches(&expected, &actual) {
                return Err(EngineError::ChecksumMismatch { expected, actual });
            }
            tracing::debug!(id = self.state.id, "sha256 verified");
        }

        let final_path = self.state.final_path().to_path_buf();
        storage.finalize(&final_path)?;
        tracing::info!(
            id = self.state.id,
            path = %final_path.display(),
            bytes = written,
            "download complete"
        );
        Ok(())
    }

    /// Stop here for good: drop the store record and (unless configured
    /// otherwise) the partial file.
    pub(super) async fn cancel_now(&mut self) {
        self.storage = None;
        match &self.state.output_path {
            Some(output) if !self.ctx.config.keep_partial_on_cancel => {
                match storage::remove_temp(output) {
                    Ok(true) => tracing::debug!(id = self.state.id, "partial file removed"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(id = self.state.id, "removing partial file: {}", e),
                }
            }
            Some(output) => tracing::info!(
                id = self.state.id,
                path = %storage::temp_path(output).display(),
                "partial file kept"
            ),
            None => {}
        }
        self.set_status(DownloadStatus::Canceled).await;
    }

    async fn upload_if_requested(&mut self) {
        if !self.state.request.upload {
            return;
        }
        let Some(provider) = self.ctx.provider.clone() else {
            tracing::warn!(id = self.state.id, "upload requested but no storage provider is installed");
            return;
        };
        let path = self.state.final_path().to_path_buf();
        match provider.upload(&path).await {
            Ok(remote) => {
                tracing::info!(
                    id = self.state.id,
                    provider = provider.name(),
                    location = %remote.location,
                    "uploaded"
                );
                self.emit(DownloadEvent::Uploaded {
                    id: self.state.id,
                    remote,
                });
            }
            Err(e) => tracing::warn!(
                id = self.state.id,
                provider = provider.name(),
                "upload failed: {:#}",
                e
            ),
        }
    }
}
