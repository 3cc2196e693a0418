//! Range fetcher: one HTTP GET for one segment, streamed by offset into the
//! destination file.
//!
//! Each fetch runs on a blocking thread (libcurl easy handle). It never
//! touches segment records; it reports byte deltas and a final outcome
//! upward through an unbounded channel and the coordinator applies them.

mod transfer;

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::config::TimeoutConfig;
use crate::retry::TransferError;
use crate::segmenter::Segment;
use crate::storage::StorageWriter;
use crate::throttle::ThrottleGate;

pub use transfer::fetch_segment;

/// Everything one fetch attempt needs, detached from the coordinator's state.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub index: usize,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Absolute offset of the first byte to fetch.
    pub offset: u64,
    /// Inclusive end, or `None` to read until the server closes.
    pub end: Option<u64>,
    /// Send a `Range` header and require `206` with a matching span.
    pub ranged: bool,
    pub chunk_size: usize,
    pub timeouts: TimeoutConfig,
}

impl FetchJob {
    pub fn for_segment(
        segment: &Segment,
        url: &str,
        headers: &BTreeMap<String, String>,
        ranged: bool,
        chunk_size: usize,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            index: segment.index,
            url: url.to_string(),
            headers: headers.clone(),
            offset: segment.next_offset(),
            end: segment.end,
            ranged,
            chunk_size: chunk_size.max(1024),
            timeouts,
        }
    }

    /// Bytes this attempt must deliver, if bounded.
    pub fn expected_len(&self) -> Option<u64> {
        self.end.map(|e| (e + 1).saturating_sub(self.offset))
    }

    /// curl `range` value (`start-end` or `start-`).
    pub fn range_spec(&self) -> String {
        match self.end {
            Some(end) => format!("{}-{}", self.offset, end),
            None => format!("{}-", self.offset),
        }
    }
}

/// How one fetch attempt ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Every requested byte was written.
    Completed,
    /// Stopped on the cancel flag; bytes already reported are on disk.
    Canceled,
    Errored(TransferError),
}

/// Upward reports from a running fetch.
#[derive(Debug)]
pub enum FetchEvent {
    /// `bytes` more bytes of segment `index` are on disk.
    Progress { index: usize, bytes: u64 },
    Finished { index: usize, outcome: FetchOutcome },
}

/// Runs `job` on the blocking pool and reports `Finished` when it ends.
pub fn spawn_fetch(
    job: FetchJob,
    storage: StorageWriter,
    gate: Arc<ThrottleGate>,
    cancel: Arc<AtomicBool>,
    events: UnboundedSender<FetchEvent>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let index = job.index;
        tracing::debug!(segment = index, range = %job.range_spec(), "fetch started");
        let outcome = fetch_segment(&job, &storage, &gate, &cancel, &events);
        tracing::debug!(segment = index, ?outcome, "fetch finished");
        let _ = events.send(FetchEvent::Finished { index, outcome });
    })
}
