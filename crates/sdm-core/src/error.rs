//! Engine-facing error taxonomy.
//!
//! Control-operation errors (`NotFound`, `InvalidTransition`) are returned
//! synchronously and never change a download's state. Terminal failures are
//! also recorded on the download itself as a [`Failure`](crate::model::Failure).

use thiserror::Error;

use crate::model::{DownloadId, DownloadStatus, FailureKind};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any I/O.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Stored validator no longer matches the remote resource; restart required.
    #[error("remote resource changed: {0}")]
    ResourceChanged(String),

    /// Server ignored or misreported a range request.
    #[error("range mismatch on segment {index}: {detail}")]
    RangeMismatch { index: usize, detail: String },

    /// A segment permanently failed after its retry budget.
    #[error("segment {index} failed after {attempts} attempt(s): {last_error}")]
    SegmentExhausted {
        index: usize,
        attempts: u32,
        last_error: String,
    },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("output incomplete: wrote {written} of {expected} bytes")]
    IncompleteOutput { expected: u64, written: u64 },

    #[error("download {0} not found")]
    NotFound(DownloadId),

    #[error("cannot {op} download {id} while it is {status}")]
    InvalidTransition {
        id: DownloadId,
        op: &'static str,
        status: DownloadStatus,
    },

    /// Store, filesystem, or probe failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Category recorded on a failed download.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            EngineError::InvalidRequest(_) => FailureKind::InvalidRequest,
            EngineError::ResourceChanged(_) => FailureKind::ResourceChanged,
            EngineError::RangeMismatch { .. } => FailureKind::RangeMismatch,
            EngineError::SegmentExhausted { .. } => FailureKind::SegmentExhausted,
            EngineError::ChecksumMismatch { .. } => FailureKind::ChecksumMismatch,
            EngineError::IncompleteOutput { .. } => FailureKind::IncompleteOutput,
            EngineError::NotFound(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::Internal(_) => FailureKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_operation_and_status() {
        let e = EngineError::InvalidTransition {
            id: 7,
            op: "pause",
            status: DownloadStatus::Completed,
        };
        assert_eq!(e.to_string(), "cannot pause download 7 while it is completed");
    }

    #[test]
    fn failure_kinds() {
        let e = EngineError::SegmentExhausted {
            index: 2,
            attempts: 3,
            last_error: "HTTP 500".into(),
        };
        assert_eq!(e.failure_kind(), FailureKind::SegmentExhausted);
        assert!(e.to_string().contains("3 attempt(s)"));
        let e = EngineError::Internal(anyhow::anyhow!("disk full"));
        assert_eq!(e.failure_kind(), FailureKind::Io);
    }
}
