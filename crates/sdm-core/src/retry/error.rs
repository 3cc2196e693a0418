//! Per-attempt transfer error, classified before it becomes an engine error.

use thiserror::Error;

/// Error from a single probe or range-fetch attempt.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Server ignored the Range header or answered with a different span.
    #[error("range mismatch: {0}")]
    RangeMismatch(String),
    /// Body ended before the requested span was delivered.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Disk write failed (disk full, permission denied). Not retried.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
}
