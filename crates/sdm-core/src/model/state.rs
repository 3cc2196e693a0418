//! Durable download state: what the resume store snapshots.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{DownloadId, DownloadRequest, DownloadStatus, Failure, SegmentStatus};
use crate::segmenter::Segment;

/// Bumped whenever the snapshot layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

/// What the probe learned about the remote resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// `None` when the server does not report a length.
    pub total_size: Option<u64>,
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// File name from `Content-Disposition`, if any.
    pub filename: Option<String>,
}

impl ResourceMetadata {
    /// True if segmented (ranged) fetching is possible.
    pub fn is_segmentable(&self) -> bool {
        self.accept_ranges && self.total_size.map_or(false, |n| n > 0)
    }
}

/// One download. Owned by its coordinator while active; the store only ever
/// sees serialized copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadState {
    pub version: u32,
    pub id: DownloadId,
    pub request: DownloadRequest,
    /// Set by the first successful probe.
    #[serde(default)]
    pub metadata: Option<ResourceMetadata>,
    /// Final output file, resolved once the probe has run.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    pub status: DownloadStatus,
    #[serde(default)]
    pub failure: Option<Failure>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DownloadState {
    pub fn new(id: DownloadId, request: DownloadRequest, now: i64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id,
            request,
            metadata: None,
            output_path: None,
            segments: Vec::new(),
            status: DownloadStatus::Planned,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of per-segment completed bytes.
    pub fn bytes_done(&self) -> u64 {
        self.segments.iter().map(|s| s.completed).sum()
    }

    pub fn total_size(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.total_size)
    }

    pub fn all_done(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(|s| s.status == SegmentStatus::Done)
    }

    /// Where the final file lands: the resolved output path, else the request destination.
    pub fn final_path(&self) -> &Path {
        self.output_path
            .as_deref()
            .unwrap_or(self.request.destination.as_path())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::plan_segments;

    fn meta(size: u64) -> ResourceMetadata {
        ResourceMetadata {
            total_size: Some(size),
            accept_ranges: true,
            etag: Some("\"v1\"".into()),
            ..Default::default()
        }
    }

    #[test]
    fn json_snapshot_is_independent_copy() {
        let req = DownloadRequest::new("https://example.com/f.bin", "/tmp/f.bin");
        let mut st = DownloadState::new(3, req, 100);
        st.metadata = Some(meta(1000));
        st.segments = plan_segments(st.metadata.as_ref().unwrap(), 4).unwrap();
        st.segments[1].completed = 120;

        let json = st.to_json().unwrap();
        st.segments[1].completed = 250;

        let back = DownloadState::from_json(&json).unwrap();
        assert_eq!(back.version, SNAPSHOT_VERSION);
        assert_eq!(back.segments[1].completed, 120);
        assert_eq!(back.bytes_done(), 120);
        assert_eq!(back.total_size(), Some(1000));
        assert_eq!(back.final_path(), Path::new("/tmp/f.bin"));
    }

    #[test]
    fn segmentable_needs_ranges_and_size() {
        assert!(meta(10).is_segmentable());
        assert!(!meta(0).is_segmentable());
        let m = ResourceMetadata {
            total_size: Some(10),
            accept_ranges: false,
            ..Default::default()
        };
        assert!(!m.is_segmentable());
    }
}
