//! Output file naming.
//!
//! When a request names a directory rather than a file, the output name is
//! derived from the server's `Content-Disposition` or the URL path and
//! sanitized for Linux filesystems.

mod content_disposition;
mod path;
mod sanitize;

use std::path::{Path, PathBuf};

use crate::model::ResourceMetadata;

pub use content_disposition::parse_content_disposition_filename;
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Used when neither the server nor the URL suggest anything usable.
const DEFAULT_FILENAME: &str = "download.bin";

/// Derives a safe filename from a server-suggested name or the URL's last path segment.
///
/// - `derive_filename("https://example.com/archive.zip", None)` is `"archive.zip"`
/// - `derive_filename("https://example.com/", Some("report.pdf"))` is `"report.pdf"`
pub fn derive_filename(url: &str, suggested: Option<&str>) -> String {
    let raw = suggested
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| filename_from_url_path(url));

    match raw.map(|r| sanitize_filename(&r)) {
        Some(name) if !name.is_empty() && name != "." && name != ".." => name,
        _ => DEFAULT_FILENAME.to_string(),
    }
}

/// Final output path for `destination`: itself, or a derived name inside it
/// when it is an existing directory.
pub fn resolve_output_path(destination: &Path, url: &str, meta: &ResourceMetadata) -> PathBuf {
    if destination.is_dir() {
        destination.join(derive_filename(url, meta.filename.as_deref()))
    } else {
        destination.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_filename_from_url_path() {
        assert_eq!(
            derive_filename("https://example.com/archive.zip", None),
            "archive.zip"
        );
        assert_eq!(
            derive_filename("https://cdn.example.com/path/to/debian-12.iso", None),
            "debian-12.iso"
        );
    }

    #[test]
    fn suggested_name_wins_and_is_sanitized() {
        assert_eq!(
            derive_filename("https://example.com/archive.zip", Some("real-name.tar.gz")),
            "real-name.tar.gz"
        );
        assert_eq!(
            derive_filename("https://example.com/", Some("../../etc/passwd")),
            "etc_passwd"
        );
    }

    #[test]
    fn fallback_name() {
        assert_eq!(derive_filename("https://example.com/", None), "download.bin");
        assert_eq!(derive_filename("https://example.com/..", None), "download.bin");
        assert_eq!(derive_filename("https://example.com/x", Some("..")), "download.bin");
    }

    #[test]
    fn resolve_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let meta = ResourceMetadata {
            filename: Some("report.pdf".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_output_path(dir.path(), "https://example.com/dl?id=3", &meta),
            dir.path().join("report.pdf")
        );
        let file = dir.path().join("named.bin");
        assert_eq!(
            resolve_output_path(&file, "https://example.com/other.iso", &meta),
            file
        );
    }
}
