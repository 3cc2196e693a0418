//! Persistent resume store (SQLite via sqlx).
//!
//! One row per download id. The full `DownloadState` lives in the row as a
//! versioned JSON snapshot; a few columns (url, destination, status, size)
//! are kept beside it for listing without deserializing. Reads and writes go
//! through explicit serialize/deserialize calls, so nothing aliases the
//! coordinator's live state.
//!
//! Completed downloads leave that table and get a row in `history` instead.

mod db;
mod history;
mod records;

pub use db::{default_db_path, ResumeStore};
pub use history::HistoryEntry;
pub use records::StoredSummary;

pub(crate) use db::unix_timestamp;

#[cfg(test)]
mod tests;
