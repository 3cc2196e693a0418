//! Download registry: the engine's public face.
//!
//! An [`Engine`] is an explicit context object owning the shared throttle
//! gate, the resume store, the event channel and a mutex-guarded map from
//! download id to the handle of its coordinator task. The lock is only held
//! for map lookups, never across I/O or an await.

mod handle;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};

use crate::config::SdmConfig;
use crate::coordinator::{Coordinator, EngineContext};
use crate::error::EngineError;
use crate::events::{DownloadEvent, EVENT_CAPACITY};
use crate::model::{DownloadId, DownloadRequest, DownloadState, DownloadStatus};
use crate::progress::ProgressSnapshot;
use crate::provider::StorageProvider;
use crate::resume_store::ResumeStore;
use crate::throttle::ThrottleGate;

use handle::{DownloadHandle, Op};

struct Inner {
    ctx: EngineContext,
    downloads: Mutex<HashMap<DownloadId, DownloadHandle>>,
}

impl Inner {
    fn downloads(&self) -> MutexGuard<'_, HashMap<DownloadId, DownloadHandle>> {
        self.downloads.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Handle to a running download engine. Cheap to clone; dropping the last
/// clone lets paused downloads' tasks exit (their state is already stored).
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Must be called inside a tokio runtime before any download is submitted.
    pub fn new(config: SdmConfig, store: ResumeStore) -> Self {
        Self::build(config, store, None)
    }

    /// Like [`Engine::new`], with an upload hook for requests that ask for one.
    pub fn with_provider(
        config: SdmConfig,
        store: ResumeStore,
        provider: Arc<dyn StorageProvider>,
    ) -> Self {
        Self::build(config, store, Some(provider))
    }

    fn build(config: SdmConfig, store: ResumeStore, provider: Option<Arc<dyn StorageProvider>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let gate = Arc::new(ThrottleGate::new(config.max_bytes_per_sec));
        let ctx = EngineContext {
            config: Arc::new(config),
            store,
            gate,
            events,
            provider,
        };
        Self {
            inner: Arc::new(Inner {
                ctx,
                downloads: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SdmConfig {
        &self.inner.ctx.config
    }

    /// Re-populate the registry from the resume store. Records a crash left
    /// `Planned` or `Running` come back `Paused`. Returns how many were loaded.
    pub async fn restore(&self) -> Result<usize, EngineError> {
        let mut restored = 0;
        for mut state in self.inner.ctx.store.load_all().await? {
            if self.inner.downloads().contains_key(&state.id) {
                continue;
            }
            match state.status {
                DownloadStatus::Planned | DownloadStatus::Running => {
                    tracing::info!(id = state.id, from = %state.status, "restored as paused");
                    state.status = DownloadStatus::Paused;
                    self.inner.ctx.store.save(&state).await?;
                }
                DownloadStatus::Paused | DownloadStatus::Failed => {}
                DownloadStatus::Completed | DownloadStatus::Canceled => {
                    tracing::warn!(id = state.id, status = %state.status, "stale record dropped");
                    self.inner.ctx.store.delete(state.id).await?;
                    continue;
                }
            }
            self.spawn(state, false)?;
            restored += 1;
        }
        tracing::info!(restored, "registry restored");
        Ok(restored)
    }

    /// Start a fresh download. Fails with `InvalidRequest` before any I/O
    /// when the request is malformed or its destination is already taken.
    pub async fn submit(&self, request: DownloadRequest) -> Result<DownloadId, EngineError> {
        request.validate()?;
        self.check_destination(&request)?;
        let state = self.inner.ctx.store.insert(&request).await?;
        let id = state.id;
        if let Err(e) = self.spawn(state, true) {
            // Lost a race with a concurrent submit for the same path.
            self.inner.ctx.store.delete(id).await?;
            return Err(e);
        }
        tracing::info!(id, url = %request.url, "submitted");
        Ok(id)
    }

    pub async fn pause(&self, id: DownloadId) -> Result<(), EngineError> {
        self.control(id, Op::Pause).await
    }

    /// Only valid from `Paused`. Returns once the resource has been
    /// re-validated, so a changed resource surfaces here as `ResourceChanged`.
    pub async fn resume(&self, id: DownloadId) -> Result<(), EngineError> {
        self.control(id, Op::Resume).await
    }

    pub async fn cancel(&self, id: DownloadId) -> Result<(), EngineError> {
        self.control(id, Op::Cancel).await
    }

    /// Forget a failed or canceled download. Its partial file is left alone.
    pub async fn remove(&self, id: DownloadId) -> Result<(), EngineError> {
        {
            let mut downloads = self.inner.downloads();
            let handle = downloads.get(&id).ok_or(EngineError::NotFound(id))?;
            let status = handle.board.status();
            if !matches!(status, DownloadStatus::Failed | DownloadStatus::Canceled) {
                return Err(EngineError::InvalidTransition {
                    id,
                    op: "remove",
                    status,
                });
            }
            downloads.remove(&id);
        }
        self.inner.ctx.store.delete(id).await?;
        tracing::debug!(id, "removed");
        Ok(())
    }

    /// Latest aggregated snapshot. Never waits on the network.
    pub fn progress(&self, id: DownloadId) -> Result<ProgressSnapshot, EngineError> {
        self.inner
            .downloads()
            .get(&id)
            .map(|h| h.board.read())
            .ok_or(EngineError::NotFound(id))
    }

    /// Snapshots of every download the registry knows, by id.
    pub fn list(&self) -> Vec<ProgressSnapshot> {
        let mut all: Vec<_> = self
            .inner
            .downloads()
            .values()
            .map(|h| h.board.read())
            .collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Push notifications for every download of this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.ctx.events.subscribe()
    }

    /// Change the aggregate bandwidth ceiling (None or 0 = unlimited).
    /// Takes effect for running fetchers at their next chunk.
    pub fn set_bandwidth_limit(&self, bytes_per_sec: Option<u64>) {
        tracing::info!(?bytes_per_sec, "bandwidth limit changed");
        self.inner.ctx.gate.set_limit(bytes_per_sec);
    }

    pub fn bandwidth_limit(&self) -> Option<u64> {
        self.inner.ctx.gate.limit()
    }

    fn check_destination(&self, request: &DownloadRequest) -> Result<(), EngineError> {
        destination_free(&self.inner.downloads(), &request.destination)
    }

    /// Register `state` and start its coordinator task.
    fn spawn(&self, state: DownloadState, exclusive: bool) -> Result<(), EngineError> {
        let id = state.id;
        let (commands, rx) = mpsc::unbounded_channel();
        let destination = state.request.destination.clone();
        let coordinator = Coordinator::new(state, self.inner.ctx.clone(), rx);
        let handle = DownloadHandle {
            id,
            board: coordinator.board(),
            commands,
            destination,
        };
        {
            let mut downloads = self.inner.downloads();
            if exclusive {
                destination_free(&downloads, &handle.destination)?;
            }
            downloads.insert(id, handle);
        }

        let registry = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let status = coordinator.run().await;
            tracing::debug!(id, %status, "coordinator exited");
            if status == DownloadStatus::Completed {
                if let Some(inner) = registry.upgrade() {
                    inner.downloads().remove(&id);
                }
            }
        });
        Ok(())
    }

    async fn control(&self, id: DownloadId, op: Op) -> Result<(), EngineError> {
        let (board, commands) = {
            let downloads = self.inner.downloads();
            let handle = downloads.get(&id).ok_or(EngineError::NotFound(id))?;
            (handle.board.clone(), handle.commands.clone())
        };
        let invalid = || EngineError::InvalidTransition {
            id,
            op: op.name(),
            status: board.status(),
        };
        if !op.permits(board.status()) {
            return Err(invalid());
        }
        let (reply, answer) = tokio::sync::oneshot::channel();
        commands.send(op.command(reply)).map_err(|_| invalid())?;
        // A coordinator that ends first drops the reply unanswered.
        answer.await.map_err(|_| invalid())?
    }
}

/// Directory destinations never conflict: each download derives its own name.
fn destination_free(
    downloads: &HashMap<DownloadId, DownloadHandle>,
    destination: &Path,
) -> Result<(), EngineError> {
    if destination.is_dir() {
        return Ok(());
    }
    match downloads.values().find(|h| h.conflicts_with(destination)) {
        Some(h) => Err(EngineError::InvalidRequest(format!(
            "destination {} is in use by download {}",
            destination.display(),
            h.id
        ))),
        None => Ok(()),
    }
}
