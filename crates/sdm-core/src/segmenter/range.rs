//! Segment type and range planning.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{ResourceMetadata, SegmentStatus};

/// A single segment: byte range `[start, end]` (inclusive).
///
/// `end` is `None` when the resource length is unknown; such a segment runs
/// until the server closes the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (inclusive).
    pub end: Option<u64>,
    /// Bytes written so far, from `start`. Never decreases within a run.
    pub completed: u64,
    pub status: SegmentStatus,
    /// Attempts used in the current run.
    #[serde(default)]
    pub attempts: u32,
}

impl Segment {
    pub fn new(index: usize, start: u64, end: Option<u64>) -> Self {
        Self {
            index,
            start,
            end,
            completed: 0,
            status: SegmentStatus::Pending,
            attempts: 0,
        }
    }

    /// Length in bytes, if bounded.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|e| e.saturating_sub(self.start) + 1)
    }

    /// Bytes still to fetch, if bounded.
    pub fn remaining(&self) -> Option<u64> {
        self.len().map(|l| l.saturating_sub(self.completed))
    }

    /// Absolute offset of the next byte to fetch.
    pub fn next_offset(&self) -> u64 {
        self.start + self.completed
    }

    /// Every byte of a bounded segment has been written.
    pub fn is_filled(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Settles a segment whose attempt was interrupted: `Done` if it is
    /// already filled, otherwise back to `Pending`.
    pub fn requeue(&mut self) {
        self.status = if self.is_filled() {
            SegmentStatus::Done
        } else {
            SegmentStatus::Pending
        };
    }

    /// Resets progress for a fresh fetch from `start`.
    pub fn reset(&mut self) {
        self.completed = 0;
        self.status = SegmentStatus::Pending;
        self.attempts = 0;
    }
}

/// Builds a segment plan from probed metadata and a segment count.
///
/// Without range support or a known size the plan is one segment covering
/// the whole resource. Otherwise `[0, size)` is split into `n` contiguous
/// segments (clamped to `[1, size]`), and the last one absorbs the remainder.
pub fn plan_segments(meta: &ResourceMetadata, n: usize) -> Result<Vec<Segment>, EngineError> {
    let size = match meta.total_size {
        Some(size) if meta.accept_ranges => size,
        other => {
            return Ok(vec![Segment::new(0, 0, other.and_then(|s| s.checked_sub(1)))]);
        }
    };
    if size == 0 {
        return Err(EngineError::InvalidRequest(
            "server claims range support for an empty resource".into(),
        ));
    }

    let n = (n.max(1) as u64).min(size);
    let base = size / n;

    let mut out = Vec::with_capacity(n as usize);
    for i in 0..n {
        let start = i * base;
        let end = if i + 1 == n { size - 1 } else { start + base - 1 };
        out.push(Segment::new(i as usize, start, Some(end)));
    }
    Ok(out)
}
