//! Download-level and segment-level status machines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of a download.
///
/// `Planned → Running → Paused → Completed | Failed | Canceled`; only `Running`
/// may leave for `Paused`, `Completed`, `Failed`, or `Canceled`, and `Paused`
/// may only return to `Running` or go to `Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Planned,
    Running,
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Planned => "planned",
            DownloadStatus::Running => "running",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(DownloadStatus::Planned),
            "running" => Some(DownloadStatus::Running),
            "paused" => Some(DownloadStatus::Paused),
            "completed" => Some(DownloadStatus::Completed),
            "failed" => Some(DownloadStatus::Failed),
            "canceled" => Some(DownloadStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Canceled
        )
    }

    /// True if the status machine allows `self → next`.
    pub fn can_transition_to(self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        matches!(
            (self, next),
            (Planned, Running)
                | (Planned, Canceled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Canceled)
                | (Paused, Running)
                | (Paused, Canceled)
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one segment. `Errored` may go back to `Pending` under the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    InProgress,
    Done,
    Errored,
}

impl SegmentStatus {
    pub fn can_transition_to(self, next: SegmentStatus) -> bool {
        use SegmentStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Done)
                | (InProgress, Errored)
                | (InProgress, Pending)
                | (Errored, Pending)
        )
    }
}

/// Category of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    ResourceChanged,
    RangeMismatch,
    SegmentExhausted,
    ChecksumMismatch,
    IncompleteOutput,
    Io,
}

/// Terminal failure recorded on a download: category plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&crate::error::EngineError> for Failure {
    fn from(e: &crate::error::EngineError) -> Self {
        Failure::new(e.failure_kind(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_str_roundtrip() {
        for s in [
            DownloadStatus::Planned,
            DownloadStatus::Running,
            DownloadStatus::Paused,
            DownloadStatus::Completed,
            DownloadStatus::Failed,
            DownloadStatus::Canceled,
        ] {
            assert_eq!(DownloadStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(DownloadStatus::from_str("bogus"), None);
    }

    #[test]
    fn only_running_leaves_for_terminal_or_paused() {
        use DownloadStatus::*;
        assert!(Running.can_transition_to(Paused));
        assert!(Running.can_transition_to(Failed));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(Failed));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Canceled));
        for terminal in [Completed, Failed, Canceled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Running));
            assert!(!terminal.can_transition_to(Paused));
        }
    }

    #[test]
    fn errored_segment_may_be_retried() {
        assert!(SegmentStatus::Errored.can_transition_to(SegmentStatus::Pending));
        assert!(!SegmentStatus::Done.can_transition_to(SegmentStatus::Pending));
    }
}
