//! Archive index port (driven/secondary port)
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory) and don't need domain-level classification.
//! - `upsert` must be atomic per post ID and durable when it returns.
//!   Concurrent tags may write different entries at the same time.

use crate::domain::{needs_sync, ArchiveEntry, PostId, PostRecord, SyncNeed, SyncPolicy, Tag};

/// Entry counts reported by [`IArchiveIndex::count`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCounts {
    pub total: u64,
    pub with_asset: u64,
}

impl IndexCounts {
    /// Entries stored without their binary asset
    pub fn without_asset(&self) -> u64 {
        self.total.saturating_sub(self.with_asset)
    }
}

/// Durable mapping from post ID to archive entry
#[async_trait::async_trait]
pub trait IArchiveIndex: Send + Sync {
    /// Entry for `post_id`, if the post was ever materialized
    async fn lookup(&self, post_id: PostId) -> anyhow::Result<Option<ArchiveEntry>>;

    /// Atomically insert or replace the entry keyed by `entry.post_id`
    async fn upsert(&self, entry: &ArchiveEntry) -> anyhow::Result<()>;

    /// Add `tag` to the provenance of an existing entry
    ///
    /// Returns false if no entry exists for `post_id`.
    async fn record_tag(&self, post_id: PostId, tag: &Tag) -> anyhow::Result<bool>;

    /// All entries seen under `tag`, ordered by post ID
    async fn entries_for_tag(&self, tag: &Tag) -> anyhow::Result<Vec<ArchiveEntry>>;

    /// Entry counts across the whole archive
    async fn count(&self) -> anyhow::Result<IndexCounts>;

    /// Decide whether `post` must be materialized under `policy`
    async fn needs_sync(&self, post: &PostRecord, policy: SyncPolicy) -> anyhow::Result<SyncNeed> {
        let entry = self.lookup(post.id).await?;
        Ok(needs_sync(entry.as_ref(), post, policy))
    }
}
