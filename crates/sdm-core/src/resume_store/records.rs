//! Record operations: insert, save, load, list, delete.

use anyhow::{bail, Context, Result};
use sqlx::Row;

use super::db::{unix_timestamp, ResumeStore};
use crate::model::{DownloadId, DownloadRequest, DownloadState, DownloadStatus, SNAPSHOT_VERSION};

/// Column-level view of one record, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSummary {
    pub id: DownloadId,
    pub url: String,
    pub destination: String,
    pub status: Option<DownloadStatus>,
    pub total_size: Option<i64>,
    pub updated_at: i64,
}

fn decode(id: DownloadId, json: &str) -> Result<DownloadState> {
    let state = DownloadState::from_json(json)
        .with_context(|| format!("decode snapshot of download {}", id))?;
    if state.version > SNAPSHOT_VERSION {
        bail!(
            "download {} snapshot version {} is newer than supported {}",
            id,
            state.version,
            SNAPSHOT_VERSION
        );
    }
    Ok(state)
}

impl ResumeStore {
    /// Allocate an id for `request` and persist its initial `Planned` state.
    pub async fn insert(&self, request: &DownloadRequest) -> Result<DownloadState> {
        let now = unix_timestamp();
        let destination = request.destination.to_string_lossy().into_owned();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO downloads (url, destination, status, total_size, snapshot_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, NULL, '{}', ?4, ?4)
            "#,
        )
        .bind(&request.url)
        .bind(&destination)
        .bind(DownloadStatus::Planned.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let state = DownloadState::new(id, request.clone(), now);
        sqlx::query("UPDATE downloads SET snapshot_json = ?1 WHERE id = ?2")
            .bind(state.to_json()?)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(state)
    }

    /// Overwrite the snapshot for `state.id`. A record deleted meanwhile is not recreated.
    pub async fn save(&self, state: &DownloadState) -> Result<()> {
        let total_size = state.total_size().map(|n| n as i64);
        let destination = state.final_path().to_string_lossy().into_owned();
        let done = sqlx::query(
            r#"
            UPDATE downloads
            SET destination = ?1,
                status = ?2,
                total_size = ?3,
                snapshot_json = ?4,
                updated_at = ?5
            WHERE id = ?6
            "#,
        )
        .bind(destination)
        .bind(state.status.as_str())
        .bind(total_size)
        .bind(state.to_json()?)
        .bind(state.updated_at)
        .bind(state.id)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            tracing::debug!(id = state.id, "save skipped: record no longer stored");
        }
        Ok(())
    }

    pub async fn load(&self, id: DownloadId) -> Result<Option<DownloadState>> {
        let row = sqlx::query("SELECT snapshot_json FROM downloads WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(id, &r.get::<String, _>("snapshot_json")))
            .transpose()
    }

    /// Every decodable snapshot, oldest first. Undecodable rows are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<DownloadState>> {
        let rows = sqlx::query("SELECT id, snapshot_json FROM downloads ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            match decode(id, &row.get::<String, _>("snapshot_json")) {
                Ok(state) => out.push(state),
                Err(e) => tracing::warn!(id, "skipping stored download: {:#}", e),
            }
        }
        Ok(out)
    }

    /// Listing from the indexed columns, newest first.
    pub async fn list(&self) -> Result<Vec<StoredSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, url, destination, status, total_size, updated_at
            FROM downloads
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StoredSummary {
                id: row.get("id"),
                url: row.get("url"),
                destination: row.get("destination"),
                status: DownloadStatus::from_str(&row.get::<String, _>("status")),
                total_size: row.get("total_size"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Returns true if a record was removed.
    pub async fn delete(&self, id: DownloadId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM downloads WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
