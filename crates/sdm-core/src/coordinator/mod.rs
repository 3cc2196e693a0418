//! Transfer coordinator: owns one download from `Planned` to a terminal status.
//!
//! Runs as one tokio task per download and is the only writer of the
//! download's status and segment table. Range fetchers report upward through
//! a channel; control commands arrive on another. The registry only ever
//! talks to a coordinator through its command channel and progress board.

mod finish;
mod prepare;
mod transfer;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::SdmConfig;
use crate::error::EngineError;
use crate::events::DownloadEvent;
use crate::model::{DownloadState, DownloadStatus, Failure};
use crate::progress::{ProgressBoard, ProgressSnapshot, RateWindow, RATE_WINDOW};
use crate::provider::StorageProvider;
use crate::resume_store::{unix_timestamp, ResumeStore};
use crate::storage::StorageWriter;
use crate::throttle::ThrottleGate;

/// Engine-wide collaborators handed to every coordinator.
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub config: Arc<SdmConfig>,
    pub store: ResumeStore,
    pub gate: Arc<ThrottleGate>,
    pub events: broadcast::Sender<DownloadEvent>,
    pub provider: Option<Arc<dyn StorageProvider>>,
}

pub(crate) type Reply = oneshot::Sender<Result<(), EngineError>>;

/// Control requests from the registry. Each carries its reply channel.
pub(crate) enum Command {
    Pause(Reply),
    Resume(Reply),
    Cancel(Reply),
}

pub(crate) struct Coordinator {
    state: DownloadState,
    ctx: EngineContext,
    board: ProgressBoard,
    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    storage: Option<StorageWriter>,
    rate: RateWindow,
    /// Segments currently waiting out a retry backoff.
    backoff: usize,
    /// Reply for a `resume` still being prepared.
    pending_resume: Option<Reply>,
    /// Time spent in transfer phases by this process, and bytes they fetched.
    active: Duration,
    fetched: u64,
}

impl Coordinator {
    pub(crate) fn new(
        state: DownloadState,
        ctx: EngineContext,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let board = ProgressBoard::new(ProgressSnapshot::from_state(&state, 0.0, false));
        Self {
            state,
            ctx,
            board,
            commands,
            commands_open: true,
            storage: None,
            rate: RateWindow::new(RATE_WINDOW),
            backoff: 0,
            pending_resume: None,
            active: Duration::ZERO,
            fetched: 0,
        }
    }

    pub(crate) fn board(&self) -> ProgressBoard {
        self.board.clone()
    }

    /// Drives the download until it is terminal, or paused with the engine gone.
    pub(crate) async fn run(mut self) -> DownloadStatus {
        loop {
            match self.state.status {
                DownloadStatus::Planned => self.set_status(DownloadStatus::Running).await,
                DownloadStatus::Running => self.activate().await,
                DownloadStatus::Paused => {
                    if !self.idle().await {
                        return DownloadStatus::Paused;
                    }
                }
                terminal => return terminal,
            }
        }
    }

    /// Prepare (probe, plan or validate) then transfer.
    async fn activate(&mut self) {
        match self.prepare().await {
            Ok(ready) => {
                self.answer_resume(Ok(()));
                if ready {
                    self.transfer().await;
                }
            }
            Err(e) => {
                tracing::warn!(id = self.state.id, "download failed before transfer: {}", e);
                self.record_failure(&e).await;
                self.answer_resume(Err(e));
            }
        }
    }

    /// Waits in `Paused` for the next command. False once the engine is gone.
    async fn idle(&mut self) -> bool {
        let Some(cmd) = self.commands.recv().await else {
            self.commands_open = false;
            return false;
        };
        match cmd {
            Command::Resume(reply) => {
                tracing::info!(id = self.state.id, "resuming");
                self.pending_resume = Some(reply);
                self.set_status(DownloadStatus::Running).await;
            }
            Command::Cancel(reply) => {
                self.cancel_now().await;
                let _ = reply.send(Ok(()));
            }
            Command::Pause(reply) => {
                let _ = reply.send(Err(self.invalid("pause")));
            }
        }
        true
    }

    fn invalid(&self, op: &'static str) -> EngineError {
        EngineError::InvalidTransition {
            id: self.state.id,
            op,
            status: self.state.status,
        }
    }

    fn answer_resume(&mut self, result: Result<(), EngineError>) {
        if let Some(reply) = self.pending_resume.take() {
            let _ = reply.send(result);
        }
    }

    /// Runs `fut` while answering control commands. `None` if a pause or
    /// cancel took effect first. Only used outside the transfer phase.
    async fn interruptible<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Some(out),
                cmd = self.commands.recv(), if self.commands_open => match cmd {
                    None => self.commands_open = false,
                    Some(Command::Pause(reply)) => {
                        self.set_status(DownloadStatus::Paused).await;
                        self.answer_resume(Ok(()));
                        let _ = reply.send(Ok(()));
                        return None;
                    }
                    Some(Command::Cancel(reply)) => {
                        self.cancel_now().await;
                        self.answer_resume(Ok(()));
                        let _ = reply.send(Ok(()));
                        return None;
                    }
                    Some(Command::Resume(reply)) => {
                        let _ = reply.send(Err(self.invalid("resume")));
                    }
                },
            }
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::from_state(&self.state, self.rate.bytes_per_sec(), self.backoff > 0)
    }

    fn publish(&self) {
        self.board.publish(self.snapshot());
    }

    fn emit(&self, event: DownloadEvent) {
        // No subscribers is fine.
        let _ = self.ctx.events.send(event);
    }

    /// Persist the current state and announce it. Failures are logged; the
    /// transfer goes on and the next checkpoint retries.
    async fn checkpoint(&mut self) {
        self.state.updated_at = unix_timestamp();
        if let Err(e) = self.ctx.store.save(&self.state).await {
            tracing::warn!(id = self.state.id, "checkpoint failed: {:#}", e);
        }
        let snap = self.snapshot();
        self.board.publish(snap.clone());
        self.emit(DownloadEvent::Checkpoint(snap));
    }

    /// The single place status changes. Completed and canceled downloads
    /// leave the store; everything else is persisted.
    async fn set_status(&mut self, next: DownloadStatus) {
        let prev = self.state.status;
        if !prev.can_transition_to(next) {
            tracing::error!(id = self.state.id, %prev, %next, "illegal status transition ignored");
            return;
        }
        self.state.status = next;
        self.state.updated_at = unix_timestamp();
        tracing::info!(id = self.state.id, "{} -> {}", prev, next);

        let stored = if next == DownloadStatus::Completed || next == DownloadStatus::Canceled {
            self.ctx.store.delete(self.state.id).await.map(|_| ())
        } else {
            self.ctx.store.save(&self.state).await
        };
        if let Err(e) = stored {
            tracing::warn!(id = self.state.id, "persisting {} failed: {:#}", next, e);
        }

        self.publish();
        self.emit(DownloadEvent::StatusChanged {
            id: self.state.id,
            status: next,
            failure: self.state.failure.clone(),
        });
    }

    /// Running → Failed with `e` recorded. The partial file stays on disk.
    async fn record_failure(&mut self, e: &EngineError) {
        if let Some(storage) = self.storage.take() {
            if let Err(se) = storage.sync() {
                tracing::debug!(id = self.state.id, "sync before failure: {:#}", se);
            }
        }
        self.state.failure = Some(Failure::from(e));
        self.set_status(DownloadStatus::Failed).await;
    }
}
