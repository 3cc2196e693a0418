//! Storage-provider extension point.
//!
//! Cloud integrations implement [`StorageProvider`] outside this crate; the
//! engine only calls `upload` on a finished file when the request asked for
//! it, and never depends on a concrete provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a provider put an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub provider: String,
    /// Provider-specific location (URL, object key, file id).
    pub location: String,
}

#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short name used in logs and in [`RemoteRef::provider`].
    fn name(&self) -> &str;

    /// Upload the completed file at `path`.
    async fn upload(&self, path: &Path) -> anyhow::Result<RemoteRef>;
}
