//! The transfer phase: bounded concurrent fetchers, retries with backoff,
//! periodic checkpoints, and cooperative pause/cancel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::{Command, Coordinator, Reply};
use crate::error::EngineError;
use crate::events::DownloadEvent;
use crate::fetcher::{spawn_fetch, FetchEvent, FetchJob, FetchOutcome};
use crate::model::{DownloadStatus, SegmentStatus};
use crate::retry::{classify, RetryDecision, RetryPolicy, TransferError};

/// Why the transfer loop is winding down early.
enum Halt {
    Pause(Reply),
    Cancel(Reply),
}

impl Coordinator {
    pub(super) async fn transfer(&mut self) {
        let Some(storage) = self.storage.clone() else {
            self.record_failure(&EngineError::from(anyhow!("no output file open"))).await;
            return;
        };
        let ranged = self
            .state
            .metadata
            .as_ref()
            .map_or(false, |m| m.is_segmentable());
        let policy = self.ctx.config.retry_policy();
        let timeouts = self.ctx.config.timeouts();
        let chunk_size = self.ctx.config.chunk_size_bytes;
        let max_in_flight = self.ctx.config.max_concurrent_fetches.max(1);

        let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel::<FetchEvent>();
        let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<usize>();
        let cancel = Arc::new(AtomicBool::new(false));

        for seg in &mut self.state.segments {
            if seg.status != SegmentStatus::Done && seg.is_filled() {
                seg.status = SegmentStatus::Done;
            }
        }
        let mut pending: VecDeque<usize> = self
            .state
            .segments
            .iter()
            .filter(|s| s.status != SegmentStatus::Done)
            .map(|s| s.index)
            .collect();
        let mut in_flight = 0usize;
        let mut halt: Option<Halt> = None;
        let mut doomed: Option<EngineError> = None;
        self.backoff = 0;
        self.rate.reset();
        self.rate.record(Instant::now(), self.state.bytes_done());

        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.ctx.config.checkpoint_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::debug!(
            id = self.state.id,
            segments = pending.len(),
            max_in_flight,
            "transfer started"
        );

        loop {
            while halt.is_none() && doomed.is_none() && in_flight < max_in_flight {
                let Some(index) = pending.pop_front() else {
                    break;
                };
                let seg = &mut self.state.segments[index];
                seg.status = SegmentStatus::InProgress;
                seg.attempts += 1;
                let job = FetchJob::for_segment(
                    seg,
                    &self.state.request.url,
                    &self.state.request.headers,
                    ranged,
                    chunk_size,
                    timeouts,
                );
                spawn_fetch(
                    job,
                    storage.clone(),
                    Arc::clone(&self.ctx.gate),
                    Arc::clone(&cancel),
                    fetch_tx.clone(),
                );
                in_flight += 1;
            }

            let drained = pending.is_empty() && self.backoff == 0;
            if in_flight == 0 && (halt.is_some() || doomed.is_some() || drained) {
                break;
            }

            tokio::select! {
                Some(event) = fetch_rx.recv() => match event {
                    FetchEvent::Progress { index, bytes } => {
                        self.state.segments[index].completed += bytes;
                        self.fetched += bytes;
                        self.rate.record(Instant::now(), self.state.bytes_done());
                        self.publish();
                    }
                    FetchEvent::Finished { index, outcome } => {
                        in_flight -= 1;
                        match outcome {
                            FetchOutcome::Completed => {
                                self.state.segments[index].status = SegmentStatus::Done;
                                tracing::debug!(id = self.state.id, segment = index, "segment done");
                                self.checkpoint().await;
                            }
                            FetchOutcome::Canceled => self.state.segments[index].requeue(),
                            FetchOutcome::Errored(_) if halt.is_some() => {
                                self.state.segments[index].requeue();
                            }
                            FetchOutcome::Errored(err) => {
                                if let Some(fatal) = self.on_fetch_error(index, err, ranged, &policy, &retry_tx) {
                                    doomed.get_or_insert(fatal);
                                }
                            }
                        }
                    }
                },
                Some(index) = retry_rx.recv() => {
                    self.backoff -= 1;
                    if halt.is_none() && doomed.is_none() {
                        pending.push_back(index);
                    }
                    self.publish();
                }
                _ = ticker.tick() => self.checkpoint().await,
                cmd = self.commands.recv(), if self.commands_open && halt.is_none() => match cmd {
                    None => self.commands_open = false,
                    Some(Command::Pause(reply)) => {
                        tracing::info!(id = self.state.id, in_flight, "pausing");
                        cancel.store(true, Ordering::Relaxed);
                        halt = Some(Halt::Pause(reply));
                    }
                    Some(Command::Cancel(reply)) => {
                        tracing::info!(id = self.state.id, in_flight, "canceling");
                        cancel.store(true, Ordering::Relaxed);
                        halt = Some(Halt::Cancel(reply));
                    }
                    Some(Command::Resume(reply)) => {
                        let _ = reply.send(Err(self.invalid("resume")));
                    }
                },
            }
        }

        self.active += started.elapsed();
        // Backoff timers still running fire into a closed channel.
        self.backoff = 0;
        for seg in &mut self.state.segments {
            if seg.status == SegmentStatus::InProgress {
                seg.requeue();
            }
        }

        match (halt, doomed) {
            (Some(Halt::Pause(reply)), _) => {
                if let Err(e) = storage.sync() {
                    tracing::warn!(id = self.state.id, "sync on pause failed: {:#}", e);
                }
                self.storage = None;
                self.rate.reset();
                self.set_status(DownloadStatus::Paused).await;
                let _ = reply.send(Ok(()));
            }
            (Some(Halt::Cancel(reply)), _) => {
                self.cancel_now().await;
                let _ = reply.send(Ok(()));
            }
            (None, Some(fatal)) => {
                tracing::warn!(id = self.state.id, "download failed: {}", fatal);
                self.record_failure(&fatal).await;
            }
            (None, None) => self.finish(storage).await,
        }
    }

    /// Applies the retry policy to a failed attempt. Returns the terminal
    /// error when the segment cannot be retried.
    pub(super) fn on_fetch_error(
        &mut self,
        index: usize,
        err: TransferError,
        ranged: bool,
        policy: &RetryPolicy,
        retry_tx: &mpsc::UnboundedSender<usize>,
    ) -> Option<EngineError> {
        let id = self.state.id;
        let seg = &mut self.state.segments[index];
        seg.status = SegmentStatus::Errored;
        let attempt = seg.attempts;

        match policy.decide(attempt, classify(&err)) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(id, segment = index, attempt, ?delay, "segment failed, retrying: {}", err);
                // Without ranges the body can only be fetched from the start.
                if !ranged {
                    seg.completed = 0;
                }
                seg.status = SegmentStatus::Pending;
                self.backoff += 1;
                let tx = retry_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(index);
                });
                self.emit(DownloadEvent::Retrying {
                    id,
                    segment: index,
                    attempt,
                    delay,
                });
                self.publish();
                None
            }
            RetryDecision::NoRetry => {
                tracing::warn!(id, segment = index, attempt, "segment failed permanently: {}", err);
                Some(match err {
                    TransferError::RangeMismatch(detail) => EngineError::RangeMismatch { index, detail },
                    other => EngineError::SegmentExhausted {
                        index,
                        attempts: attempt,
                        last_error: other.to_string(),
                    },
                })
            }
        }
    }
}
