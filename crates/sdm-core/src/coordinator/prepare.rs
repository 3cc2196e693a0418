//! Start and resume paths: probe, then plan a fresh download or re-validate
//! a stored one before any byte is fetched.

use anyhow::anyhow;

use super::Coordinator;
use crate::checksum;
use crate::error::EngineError;
use crate::model::{DownloadStatus, ResourceMetadata, SegmentStatus};
use crate::probe;
use crate::retry::{classify, RetryDecision};
use crate::safe_resume::validate_for_resume;
use crate::segmenter::plan_segments;
use crate::storage::{self, StorageWriter, StorageWriterBuilder};
use crate::url_model::resolve_output_path;

impl Coordinator {
    /// Ok(true) when segments are ready to fetch; Ok(false) when the download
    /// already settled (paused, canceled, or found complete on disk).
    pub(super) async fn prepare(&mut self) -> Result<bool, EngineError> {
        let Some(meta) = self.probe_with_retry().await? else {
            return Ok(false);
        };
        let resuming = self.state.metadata.is_some() && !self.state.segments.is_empty();
        if resuming {
            self.prepare_resume(meta).await?;
            return Ok(true);
        }
        self.prepare_fresh(meta).await
    }

    async fn probe_with_retry(&mut self) -> Result<Option<ResourceMetadata>, EngineError> {
        let policy = self.ctx.config.retry_policy();
        let timeouts = self.ctx.config.timeouts();
        let mut attempt = 1u32;
        loop {
            let url = self.state.request.url.clone();
            let headers = self.state.request.headers.clone();
            let task = tokio::task::spawn_blocking(move || probe::probe(&url, &headers, &timeouts));
            let Some(joined) = self.interruptible(task).await else {
                return Ok(None);
            };
            let err = match joined {
                Ok(Ok(meta)) => {
                    tracing::debug!(
                        id = self.state.id,
                        size = ?meta.total_size,
                        ranges = meta.accept_ranges,
                        "probed"
                    );
                    return Ok(Some(meta));
                }
                Ok(Err(e)) => e,
                Err(join) => return Err(anyhow!("probe task failed: {}", join).into()),
            };
            match policy.decide(attempt, classify(&err)) {
                RetryDecision::NoRetry => {
                    return Err(anyhow!("probe {} failed: {}", self.state.request.url, err).into());
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(id = self.state.id, attempt, ?delay, "probe failed, retrying: {}", err);
                    if self.interruptible(tokio::time::sleep(delay)).await.is_none() {
                        return Ok(None);
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn prepare_fresh(&mut self, meta: ResourceMetadata) -> Result<bool, EngineError> {
        let output = resolve_output_path(&self.state.request.destination, &self.state.request.url, &meta);
        self.state.output_path = Some(output.clone());

        let n = self
            .ctx
            .config
            .segment_count_for(self.state.request.segments, meta.total_size);
        self.state.segments = plan_segments(&meta, n)?;

        if let Some(size) = meta.total_size {
            if storage::is_complete_file(&output, size) && self.existing_matches_digest(&output).await {
                tracing::info!(id = self.state.id, path = %output.display(), "already downloaded");
                for seg in &mut self.state.segments {
                    seg.completed = seg.len().unwrap_or(0);
                    seg.status = SegmentStatus::Done;
                }
                self.state.metadata = Some(meta);
                self.set_status(DownloadStatus::Completed).await;
                return Ok(false);
            }
        }

        let temp = storage::temp_path(&output);
        let mut builder = StorageWriterBuilder::create(&temp)?;
        if let Some(size) = meta.total_size {
            builder.preallocate(size)?;
        }
        self.storage = Some(builder.build());
        tracing::info!(
            id = self.state.id,
            path = %output.display(),
            segments = self.state.segments.len(),
            "planned"
        );
        self.state.metadata = Some(meta);
        self.checkpoint().await;
        Ok(true)
    }

    /// With a digest on the request, an existing file only counts if it matches.
    async fn existing_matches_digest(&self, path: &std::path::Path) -> bool {
        let Some(expected) = self.state.request.sha256.clone() else {
            return true;
        };
        match checksum::sha256_file(path.to_path_buf()).await {
            Ok(actual) => checksum::digest_matches(&expected, &actual),
            Err(_) => false,
        }
    }

    async fn prepare_resume(&mut self, meta: ResourceMetadata) -> Result<(), EngineError> {
        validate_for_resume(self.state.metadata.as_ref(), &meta)
            .map_err(|e| EngineError::ResourceChanged(e.to_string()))?;

        let output = self.state.final_path().to_path_buf();
        let temp = storage::temp_path(&output);
        let ranged = meta.is_segmentable();

        // Fresh attempt budget per run; interrupted work goes back to Pending
        // unless all of its bytes already landed.
        for seg in &mut self.state.segments {
            seg.attempts = 0;
            if seg.status != SegmentStatus::Done {
                seg.requeue();
            }
            if !ranged && seg.status != SegmentStatus::Done {
                seg.completed = 0;
            }
        }

        let expected_len = meta.total_size;
        let reopened = StorageWriter::open_existing(&temp).ok().filter(|w| match expected_len {
            Some(size) => w.file_len().map_or(false, |len| len == size),
            None => true,
        });
        let writer = match reopened {
            Some(w) => w,
            None => {
                if self.state.bytes_done() > 0 {
                    tracing::warn!(
                        id = self.state.id,
                        path = %temp.display(),
                        "partial file missing or resized; restarting from zero"
                    );
                }
                for seg in &mut self.state.segments {
                    seg.reset();
                }
                let mut builder = StorageWriterBuilder::create(&temp)?;
                if let Some(size) = expected_len {
                    builder.preallocate(size)?;
                }
                builder.build()
            }
        };
        self.storage = Some(writer);
        self.state.metadata = Some(meta);
        tracing::info!(
            id = self.state.id,
            done = self.state.bytes_done(),
            remaining_segments = self
                .state
                .segments
                .iter()
                .filter(|s| s.status != SegmentStatus::Done)
                .count(),
            "resume validated"
        );
        self.checkpoint().await;
        Ok(())
    }
}
