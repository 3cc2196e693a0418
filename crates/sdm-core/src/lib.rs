//! Segmented HTTP download engine.
//!
//! A download is probed, split into byte-range segments, fetched by
//! concurrent range fetchers under a shared bandwidth gate, checkpointed to
//! a SQLite resume store, and finalized by renaming `<output>.part` into
//! place. [`Engine`] is the entry point.

pub mod config;
pub mod logging;

pub mod checksum;
mod coordinator;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod model;
pub mod probe;
pub mod progress;
pub mod provider;
pub mod registry;
pub mod resume_store;
pub mod retry;
pub mod safe_resume;
pub mod segmenter;
pub mod storage;
pub mod throttle;
pub mod url_model;

pub use config::SdmConfig;
pub use error::EngineError;
pub use events::{wait_settled, DownloadEvent, Settled};
pub use model::{
    DownloadId, DownloadRequest, DownloadStatus, Failure, FailureKind, SegmentStatus,
};
pub use progress::ProgressSnapshot;
pub use provider::{RemoteRef, StorageProvider};
pub use registry::Engine;
pub use resume_store::ResumeStore;
