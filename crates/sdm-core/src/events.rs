//! Push notifications for presentation layers.
//!
//! Every coordinator publishes on one engine-wide broadcast channel:
//! status transitions, checkpoints (with a progress snapshot), retry
//! notices and upload results. Slow subscribers lag rather than block the
//! engine.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::model::{DownloadId, DownloadStatus, Failure};
use crate::progress::ProgressSnapshot;
use crate::provider::RemoteRef;

/// Buffered events per subscriber before it starts lagging.
pub const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    StatusChanged {
        id: DownloadId,
        status: DownloadStatus,
        failure: Option<Failure>,
    },
    Checkpoint(ProgressSnapshot),
    /// A segment failed transiently and will be retried after `delay`.
    Retrying {
        id: DownloadId,
        segment: usize,
        attempt: u32,
        delay: Duration,
    },
    Uploaded {
        id: DownloadId,
        remote: RemoteRef,
    },
}

impl DownloadEvent {
    pub fn id(&self) -> DownloadId {
        match self {
            DownloadEvent::StatusChanged { id, .. }
            | DownloadEvent::Retrying { id, .. }
            | DownloadEvent::Uploaded { id, .. } => *id,
            DownloadEvent::Checkpoint(snap) => snap.id,
        }
    }
}

/// Where a download came to rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub status: DownloadStatus,
    pub failure: Option<Failure>,
}

/// Waits until download `id` is paused or terminal. `None` if the channel closes first.
pub async fn wait_settled(
    rx: &mut broadcast::Receiver<DownloadEvent>,
    id: DownloadId,
) -> Option<Settled> {
    loop {
        match rx.recv().await {
            Ok(DownloadEvent::StatusChanged {
                id: eid,
                status,
                failure,
            }) if eid == id && (status == DownloadStatus::Paused || status.is_terminal()) => {
                return Some(Settled { status, failure });
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
