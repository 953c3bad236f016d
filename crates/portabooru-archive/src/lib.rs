//! Portabooru Archive - durable index of materialized posts
//!
//! Implements the [`IArchiveIndex`](portabooru_core::ports::IArchiveIndex)
//! port twice:
//!
//! - [`repository::SqliteArchiveIndex`] - SQLite in WAL mode with full
//!   synchronous writes, used by the CLI
//! - [`memory::InMemoryArchiveIndex`] - concurrent map, used by tests and
//!   dry runs
//!
//! ## Modules
//!
//! - [`pool`] - Connection pool setup and schema migrations
//! - [`repository`] - SQLite index implementation
//! - [`memory`] - In-memory index implementation

pub mod memory;
pub mod pool;
pub mod repository;

pub use memory::InMemoryArchiveIndex;
pub use pool::DatabasePool;
pub use repository::SqliteArchiveIndex;

/// Errors from the archive index storage layer
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt row for post {post_id}: {reason}")]
    CorruptRow { post_id: i64, reason: String },

    #[error("Post ID {0} does not fit the index key")]
    PostIdOutOfRange(u64),
}

impl From<sqlx::Error> for ArchiveError {
    fn from(e: sqlx::Error) -> Self {
        ArchiveError::QueryFailed(e.to_string())
    }
}
