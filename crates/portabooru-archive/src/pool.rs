//! Database connection pool management

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::ArchiveError;

/// Connection pool for the archive index database
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the index database at `db_path`
    ///
    /// The database runs in WAL mode with `synchronous = FULL`, so a
    /// committed upsert survives a crash or power loss.
    pub async fn new(db_path: &Path) -> Result<Self, ArchiveError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ArchiveError::ConnectionFailed(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ArchiveError::ConnectionFailed(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;

        tracing::info!(path = %db_path.display(), "Archive index opened");
        Ok(db)
    }

    /// Creates an in-memory database with the schema applied
    pub async fn in_memory() -> Result<Self, ArchiveError> {
        // A single connection keeps every query on the same memory database
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| ArchiveError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| ArchiveError::ConnectionFailed(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Returns the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), ArchiveError> {
        let migration_sql = include_str!("migrations/20240601_initial.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| ArchiveError::MigrationFailed(e.to_string()))?;
        Ok(())
    }
}
