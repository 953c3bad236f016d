//! SQLite implementation of the archive index
//!
//! Entries live in `archive_entries`, one row per post ID. Provenance tags
//! live in `entry_tags`. An upsert rewrites both inside one transaction, so
//! a reader never sees an entry with a partial tag set.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use portabooru_core::domain::{ArchiveEntry, Checksum, PostId, Tag};
use portabooru_core::ports::{IArchiveIndex, IndexCounts};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::pool::DatabasePool;
use crate::ArchiveError;

/// SQLite-backed archive index
pub struct SqliteArchiveIndex {
    pool: SqlitePool,
}

impl SqliteArchiveIndex {
    pub fn new(pool: &DatabasePool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// SQLite integers are signed; IDs above `i64::MAX` cannot be stored
fn key(post_id: PostId) -> Result<i64, ArchiveError> {
    i64::try_from(post_id.value()).map_err(|_| ArchiveError::PostIdOutOfRange(post_id.value()))
}

fn parse_datetime(post_id: i64, s: &str) -> Result<DateTime<Utc>, ArchiveError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ArchiveError::CorruptRow {
            post_id,
            reason: format!("synced_at {s:?}: {e}"),
        })
}

fn path_text(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

fn entry_from_row(row: &SqliteRow, tags: BTreeSet<Tag>) -> Result<ArchiveEntry, ArchiveError> {
    let post_id: i64 = row.get("post_id");
    let checksum: String = row.get("checksum");
    let directory: String = row.get("directory");
    let metadata_path: String = row.get("metadata_path");
    let tags_path: String = row.get("tags_path");
    let asset_path: Option<String> = row.get("asset_path");
    let synced_at: String = row.get("synced_at");

    let id = u64::try_from(post_id).map_err(|_| ArchiveError::CorruptRow {
        post_id,
        reason: "negative post id".into(),
    })?;

    Ok(ArchiveEntry {
        post_id: PostId::new(id),
        checksum: Checksum::new(checksum).map_err(|e| ArchiveError::CorruptRow {
            post_id,
            reason: e.to_string(),
        })?,
        directory: PathBuf::from(directory),
        metadata_path: PathBuf::from(metadata_path),
        tags_path: PathBuf::from(tags_path),
        asset_path: asset_path.map(PathBuf::from),
        tags,
        synced_at: parse_datetime(post_id, &synced_at)?,
    })
}

/// Tags stored in the index were validated on the way in; any that no
/// longer parse are skipped rather than failing the whole entry
fn collect_tags<'a>(names: impl Iterator<Item = &'a str>) -> BTreeSet<Tag> {
    names
        .filter_map(|name| match Tag::new(name) {
            Ok(tag) => Some(tag),
            Err(e) => {
                tracing::warn!(tag = name, error = %e, "Skipping unreadable tag in index");
                None
            }
        })
        .collect()
}

impl SqliteArchiveIndex {
    async fn tags_of(&self, post_id: i64) -> Result<BTreeSet<Tag>, ArchiveError> {
        let rows = sqlx::query("SELECT tag FROM entry_tags WHERE post_id = ? ORDER BY tag")
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
        let names: Vec<String> = rows.iter().map(|r| r.get("tag")).collect();
        Ok(collect_tags(names.iter().map(String::as_str)))
    }
}

// ============================================================================
// IArchiveIndex implementation
// ============================================================================

#[async_trait::async_trait]
impl IArchiveIndex for SqliteArchiveIndex {
    async fn lookup(&self, post_id: PostId) -> anyhow::Result<Option<ArchiveEntry>> {
        let id = key(post_id)?;
        let row = sqlx::query("SELECT * FROM archive_entries WHERE post_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ArchiveError::from)?;

        match row {
            Some(row) => {
                let tags = self.tags_of(id).await?;
                Ok(Some(entry_from_row(&row, tags)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, entry: &ArchiveEntry) -> anyhow::Result<()> {
        let id = key(entry.post_id)?;
        let mut tx = self.pool.begin().await.map_err(ArchiveError::from)?;

        sqlx::query(
            r#"
            INSERT INTO archive_entries
                (post_id, checksum, directory, metadata_path, tags_path, asset_path, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(post_id) DO UPDATE SET
                checksum = excluded.checksum,
                directory = excluded.directory,
                metadata_path = excluded.metadata_path,
                tags_path = excluded.tags_path,
                asset_path = excluded.asset_path,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(id)
        .bind(entry.checksum.as_str())
        .bind(path_text(&entry.directory))
        .bind(path_text(&entry.metadata_path))
        .bind(path_text(&entry.tags_path))
        .bind(entry.asset_path.as_deref().map(path_text))
        .bind(entry.synced_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(ArchiveError::from)?;

        sqlx::query("DELETE FROM entry_tags WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(ArchiveError::from)?;

        for tag in &entry.tags {
            sqlx::query("INSERT OR IGNORE INTO entry_tags (post_id, tag) VALUES (?, ?)")
                .bind(id)
                .bind(tag.as_str())
                .execute(&mut *tx)
                .await
                .map_err(ArchiveError::from)?;
        }

        tx.commit().await.map_err(ArchiveError::from)?;

        tracing::trace!(
            post_id = %entry.post_id,
            checksum = entry.checksum.as_str(),
            asset = entry.asset_present(),
            "Upserted archive entry"
        );
        Ok(())
    }

    async fn record_tag(&self, post_id: PostId, tag: &Tag) -> anyhow::Result<bool> {
        let id = key(post_id)?;
        let mut tx = self.pool.begin().await.map_err(ArchiveError::from)?;

        let exists = sqlx::query("SELECT 1 FROM archive_entries WHERE post_id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ArchiveError::from)?
            .is_some();
        if !exists {
            return Ok(false);
        }

        let result = sqlx::query("INSERT OR IGNORE INTO entry_tags (post_id, tag) VALUES (?, ?)")
            .bind(id)
            .bind(tag.as_str())
            .execute(&mut *tx)
            .await
            .map_err(ArchiveError::from)?;
        tx.commit().await.map_err(ArchiveError::from)?;

        if result.rows_affected() > 0 {
            tracing::trace!(post_id = %post_id, tag = %tag, "Recorded provenance tag");
        }
        Ok(true)
    }

    async fn entries_for_tag(&self, tag: &Tag) -> anyhow::Result<Vec<ArchiveEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT e.* FROM archive_entries e
            JOIN entry_tags t ON t.post_id = e.post_id
            WHERE t.tag = ?
            ORDER BY e.post_id
            "#,
        )
        .bind(tag.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(ArchiveError::from)?;

        let tag_rows = sqlx::query(
            r#"
            SELECT post_id, tag FROM entry_tags
            WHERE post_id IN (SELECT post_id FROM entry_tags WHERE tag = ?)
            "#,
        )
        .bind(tag.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(ArchiveError::from)?;

        let mut names: HashMap<i64, Vec<String>> = HashMap::new();
        for row in &tag_rows {
            names
                .entry(row.get("post_id"))
                .or_default()
                .push(row.get("tag"));
        }

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get("post_id");
            let tags = names
                .get(&id)
                .map(|n| collect_tags(n.iter().map(String::as_str)))
                .unwrap_or_default();
            entries.push(entry_from_row(row, tags)?);
        }
        Ok(entries)
    }

    async fn count(&self) -> anyhow::Result<IndexCounts> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(asset_path) AS with_asset FROM archive_entries",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(ArchiveError::from)?;

        let total: i64 = row.get("total");
        let with_asset: i64 = row.get("with_asset");
        Ok(IndexCounts {
            total: total.max(0) as u64,
            with_asset: with_asset.max(0) as u64,
        })
    }
}
