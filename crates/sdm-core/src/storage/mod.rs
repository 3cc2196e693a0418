//! Destination file lifecycle.
//!
//! Segments are written by offset into `<output>.part` (preallocated with
//! `posix_fallocate` where available), synced, then renamed into place. No
//! merge pass: once every segment is done the temp file already is the output.

mod builder;
mod writer;

use std::path::{Path, PathBuf};

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;

/// Temporary file suffix used before the final rename.
pub const TEMP_SUFFIX: &str = ".part";

/// `file.iso` → `file.iso.part`.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Deletes the temp file for `final_path`, if any.
pub fn remove_temp(final_path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(temp_path(final_path)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// True if `path` is a regular file of exactly `size` bytes.
pub fn is_complete_file(path: &Path, size: u64) -> bool {
    std::fs::metadata(path).map_or(false, |m| m.is_file() && m.len() == size)
}
