//! Download request accepted by the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::EngineError;

/// A request to download `url` into `destination`. Immutable once accepted.
///
/// `destination` is either the output file path or an existing directory, in
/// which case the file name is derived from the server's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Segment count hint; the engine default applies when absent.
    #[serde(default)]
    pub segments: Option<usize>,
    /// Extra request headers (auth, cookies), passed through untouched.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Expected SHA-256 of the complete file, lowercase hex.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Hand the finished file to the installed storage provider.
    #[serde(default)]
    pub upload: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            segments: None,
            headers: BTreeMap::new(),
            sha256: None,
            upload: false,
        }
    }

    pub fn with_segments(mut self, n: usize) -> Self {
        self.segments = Some(n);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_sha256(mut self, hex_digest: impl Into<String>) -> Self {
        self.sha256 = Some(hex_digest.into());
        self
    }

    pub fn with_upload(mut self, upload: bool) -> Self {
        self.upload = upload;
        self
    }

    /// Rejects malformed input before any I/O.
    pub fn validate(&self) -> Result<(), EngineError> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| EngineError::InvalidRequest(format!("malformed URL {:?}: {}", self.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EngineError::InvalidRequest(format!(
                "unsupported URL scheme {:?}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(EngineError::InvalidRequest(format!("URL has no host: {}", self.url)));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(EngineError::InvalidRequest("destination path is empty".into()));
        }
        if !self.destination.is_dir() && self.destination.file_name().is_none() {
            return Err(EngineError::InvalidRequest(format!(
                "destination has no file name: {}",
                self.destination.display()
            )));
        }
        if self.segments == Some(0) {
            return Err(EngineError::InvalidRequest("segment count must be at least 1".into()));
        }
        for (name, value) in &self.headers {
            let bad = |s: &str| s.contains('\r') || s.contains('\n');
            if name.trim().is_empty() || name.contains(':') || bad(name) || bad(value) {
                return Err(EngineError::InvalidRequest(format!("invalid header {:?}", name)));
            }
        }
        if let Some(digest) = &self.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(EngineError::InvalidRequest(format!(
                    "sha256 must be 64 hex characters, got {:?}",
                    digest
                )));
            }
        }
        Ok(())
    }
}
