//! Progress snapshots (bytes done, rate, ETA, per-segment state).
//!
//! The coordinator publishes a fresh snapshot into a [`ProgressBoard`] after
//! applying each batch of fetch reports; readers copy it out under one short
//! lock, so a snapshot is always internally consistent and reading never
//! waits on network I/O.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::model::{DownloadId, DownloadState, DownloadStatus, Failure, SegmentStatus};

/// Width of the sliding window behind `bytes_per_sec`.
pub const RATE_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentProgress {
    pub index: usize,
    pub start: u64,
    pub end: Option<u64>,
    pub completed: u64,
    pub status: SegmentStatus,
    pub attempts: u32,
}

/// Point-in-time view of one download.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub id: DownloadId,
    pub url: String,
    pub status: DownloadStatus,
    /// Sum of per-segment completed bytes.
    pub bytes_done: u64,
    /// `None` until probed, or when the server reports no length.
    pub total_bytes: Option<u64>,
    /// Recent transfer rate (sliding window).
    pub bytes_per_sec: f64,
    /// True while at least one segment waits out a retry backoff.
    pub retrying: bool,
    pub failure: Option<Failure>,
    pub segments: Vec<SegmentProgress>,
}

impl ProgressSnapshot {
    pub fn from_state(state: &DownloadState, bytes_per_sec: f64, retrying: bool) -> Self {
        Self {
            id: state.id,
            url: state.request.url.clone(),
            status: state.status,
            bytes_done: state.bytes_done(),
            total_bytes: state.total_size(),
            bytes_per_sec,
            retrying,
            failure: state.failure.clone(),
            segments: state
                .segments
                .iter()
                .map(|s| SegmentProgress {
                    index: s.index,
                    start: s.start,
                    end: s.end,
                    completed: s.completed,
                    status: s.status,
                    attempts: s.attempts,
                })
                .collect(),
        }
    }

    /// Fraction complete in [0.0, 1.0]; `None` when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_done as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    /// Estimated seconds remaining (None if the total or the rate is unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes?.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        if self.bytes_per_sec <= 0.0 {
            return None;
        }
        Some(remaining as f64 / self.bytes_per_sec)
    }
}

/// Latest snapshot of one download, shared between its coordinator and readers.
#[derive(Debug, Clone)]
pub struct ProgressBoard(Arc<Mutex<ProgressSnapshot>>);

impl ProgressBoard {
    pub fn new(initial: ProgressSnapshot) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn publish(&self, snapshot: ProgressSnapshot) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = snapshot;
    }

    pub fn read(&self) -> ProgressSnapshot {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn status(&self) -> DownloadStatus {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).status
    }
}

/// Sliding-window rate estimate over (time, cumulative bytes) samples.
#[derive(Debug)]
pub struct RateWindow {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record the cumulative byte count at `now`.
    pub fn record(&mut self, now: Instant, total: u64) {
        self.samples.push_back((now, total));
        // Keep one sample at or beyond the window edge as the baseline.
        while self.samples.len() > 2 {
            let (t1, _) = self.samples[1];
            if now.saturating_duration_since(t1) >= self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn bytes_per_sec(&self) -> f64 {
        let (Some(&(t0, b0)), Some(&(t1, b1))) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let secs = t1.saturating_duration_since(t0).as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        b1.saturating_sub(b0) as f64 / secs
    }

    /// Forget history (after a pause the old rate is meaningless).
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
