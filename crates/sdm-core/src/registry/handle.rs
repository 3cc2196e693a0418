use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::coordinator::{Command, Reply};
use crate::model::{DownloadId, DownloadStatus};
use crate::progress::ProgressBoard;

/// What the registry keeps per download: a way to read its progress and a
/// way to send it commands. Never the coordinator itself.
pub(super) struct DownloadHandle {
    pub id: DownloadId,
    pub board: ProgressBoard,
    pub commands: mpsc::UnboundedSender<Command>,
    pub destination: PathBuf,
}

impl DownloadHandle {
    /// A live download already writing to `destination`.
    pub fn conflicts_with(&self, destination: &Path) -> bool {
        self.destination == destination && !self.board.status().is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Op {
    Pause,
    Resume,
    Cancel,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Op::Pause => "pause",
            Op::Resume => "resume",
            Op::Cancel => "cancel",
        }
    }

    /// Cheap pre-check against the last published status. The coordinator
    /// has the final word.
    pub fn permits(self, status: DownloadStatus) -> bool {
        match self {
            // Planned is only ever seen before the coordinator's first step.
            Op::Pause => matches!(status, DownloadStatus::Planned | DownloadStatus::Running),
            Op::Resume => status == DownloadStatus::Paused,
            Op::Cancel => !status.is_terminal(),
        }
    }

    pub fn command(self, reply: Reply) -> Command {
        match self {
            Op::Pause => Command::Pause(reply),
            Op::Resume => Command::Resume(reply),
            Op::Cancel => Command::Cancel(reply),
        }
    }
}
