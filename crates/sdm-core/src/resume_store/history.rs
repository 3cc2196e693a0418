//! Finished-download history. Separate from the resume records, which are
//! deleted once a download completes.

use anyhow::Result;
use sqlx::Row;
use std::path::PathBuf;

use super::db::ResumeStore;
use crate::model::DownloadId;

/// One completed download.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: DownloadId,
    pub url: String,
    pub path: PathBuf,
    pub total_bytes: u64,
    /// Bytes per second over the time spent transferring.
    pub avg_bytes_per_sec: f64,
    pub started_at: i64,
    pub finished_at: i64,
}

impl ResumeStore {
    /// Record a finished download. A second entry for the same id replaces the first.
    pub async fn record_history(&self, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO history (id, url, path, total_bytes, avg_bytes_per_sec, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.url)
        .bind(entry.path.to_string_lossy().into_owned())
        .bind(entry.total_bytes as i64)
        .bind(entry.avg_bytes_per_sec)
        .bind(entry.started_at)
        .bind(entry.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recently finished first, at most `limit` entries.
    pub async fn history(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, path, total_bytes, avg_bytes_per_sec, started_at, finished_at
            FROM history
            ORDER BY finished_at DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                id: row.get("id"),
                url: row.get("url"),
                path: PathBuf::from(row.get::<String, _>("path")),
                total_bytes: row.get::<i64, _>("total_bytes").max(0) as u64,
                avg_bytes_per_sec: row.get("avg_bytes_per_sec"),
                started_at: row.get("started_at"),
                finished_at: row.get("finished_at"),
            })
            .collect())
    }
}
