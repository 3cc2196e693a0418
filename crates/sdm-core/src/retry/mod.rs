//! Retry and backoff policy.
//!
//! Error classification (timeouts, throttling, connection failures, range
//! mismatches) plus exponential backoff decisions. The coordinator consults
//! this for every failed fetch attempt and every failed probe.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
