//! In-memory archive index
//!
//! Nothing is persisted. Used by the sync engine tests.

use dashmap::DashMap;
use portabooru_core::domain::{ArchiveEntry, PostId, Tag};
use portabooru_core::ports::{IArchiveIndex, IndexCounts};

/// Archive index held in a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryArchiveIndex {
    entries: DashMap<PostId, ArchiveEntry>,
}

impl InMemoryArchiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl IArchiveIndex for InMemoryArchiveIndex {
    async fn lookup(&self, post_id: PostId) -> anyhow::Result<Option<ArchiveEntry>> {
        Ok(self.entries.get(&post_id).map(|e| e.value().clone()))
    }

    async fn upsert(&self, entry: &ArchiveEntry) -> anyhow::Result<()> {
        self.entries.insert(entry.post_id, entry.clone());
        Ok(())
    }

    async fn record_tag(&self, post_id: PostId, tag: &Tag) -> anyhow::Result<bool> {
        match self.entries.get_mut(&post_id) {
            Some(mut entry) => {
                entry.add_tag(tag.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn entries_for_tag(&self, tag: &Tag) -> anyhow::Result<Vec<ArchiveEntry>> {
        let mut entries: Vec<ArchiveEntry> = self
            .entries
            .iter()
            .filter(|e| e.has_tag(tag))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| e.post_id);
        Ok(entries)
    }

    async fn count(&self) -> anyhow::Result<IndexCounts> {
        let total = self.entries.len() as u64;
        let with_asset = self.entries.iter().filter(|e| e.asset_present()).count() as u64;
        Ok(IndexCounts { total, with_asset })
    }
}
