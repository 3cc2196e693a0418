//! Download data model: requests, resource metadata, status machine, and the
//! per-download state snapshot persisted by the resume store.

mod request;
mod state;
mod status;

pub use request::DownloadRequest;
pub use state::{DownloadState, ResourceMetadata, SNAPSHOT_VERSION};
pub use status::{DownloadStatus, Failure, FailureKind, SegmentStatus};

/// Download identifier (resume store row id).
pub type DownloadId = i64;
