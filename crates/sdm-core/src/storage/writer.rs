//! Concurrent offset writer for temp download files.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to a temp download file. Clones share one descriptor; every
/// `write_at` is positioned (pwrite), so fetchers with disjoint ranges never
/// contend.
#[derive(Debug, Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    temp_path: PathBuf,
}

impl StorageWriter {
    pub(crate) fn from_file_and_path(file: File, temp_path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            temp_path,
        }
    }

    /// Reopen a temp file left by an earlier run, without truncating it.
    pub fn open_existing(temp_path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(temp_path)
            .with_context(|| format!("failed to open existing temp file: {}", temp_path.display()))?;
        Ok(Self::from_file_and_path(file, temp_path.to_path_buf()))
    }

    /// Write all of `data` at `offset` without touching the shared cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.write_all_at(data, offset)
    }

    #[cfg(windows)]
    pub fn write_at(&self, offset: u64, mut data: &[u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut offset = offset;
        while !data.is_empty() {
            let n = self.file.seek_write(data, offset)?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            data = &data[n..];
            offset += n as u64;
        }
        Ok(())
    }

    /// Current on-disk length.
    pub fn file_len(&self) -> io::Result<u64> {
        self.file.metadata().map(|m| m.len())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().context("storage sync failed")
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Trim the file to `len` (drops preallocated space past a short body).
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .with_context(|| format!("failed to truncate {}", self.temp_path.display()))
    }

    /// Rename the temp file to `final_path`. Same-filesystem only.
    pub fn finalize(self, final_path: &Path) -> Result<()> {
        let temp_path = self.temp_path.clone();
        drop(self.file);
        std::fs::rename(&temp_path, final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                final_path.display()
            )
        })
    }
}
