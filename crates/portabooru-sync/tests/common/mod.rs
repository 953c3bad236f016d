//! In-process fakes of the remote ports for engine tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portabooru_archive::InMemoryArchiveIndex;
use portabooru_core::domain::{
    ArchiveEntry, AssetRef, Checksum, PostId, PostRecord, RetryPolicy, Tag,
};
use portabooru_core::ports::{
    IArchiveIndex, IAssetFetcher, IPostListing, IndexCounts, PageCursor, RemoteError,
};
use portabooru_sync::SyncEngine;

/// A board holding posts per tag, newest first
#[derive(Default)]
pub struct FakeBoard {
    tags: Mutex<BTreeMap<String, Vec<PostRecord>>>,
    page_size: usize,
    failing_assets: Mutex<HashSet<String>>,
    listing_error: Mutex<Option<RemoteError>>,
    asset_delay: Mutex<Option<Duration>>,
    pub asset_calls: AtomicUsize,
    pub page_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
}

impl FakeBoard {
    pub fn new(page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            page_size,
            ..Self::default()
        })
    }

    /// Adds posts `ids` to `tag`
    pub fn add(&self, tag: &str, ids: impl IntoIterator<Item = u64>) {
        let mut tags = self.tags.lock().unwrap();
        let posts = tags.entry(tag.to_string()).or_default();
        posts.extend(ids.into_iter().map(|id| post(id, "png")));
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        posts.dedup_by_key(|p| p.id);
    }

    /// Replaces the stored version of a post under every tag
    pub fn update(&self, record: PostRecord) {
        let mut tags = self.tags.lock().unwrap();
        for posts in tags.values_mut() {
            for p in posts.iter_mut().filter(|p| p.id == record.id) {
                *p = record.clone();
            }
        }
    }

    pub fn fail_asset(&self, id: u64) {
        self.failing_assets.lock().unwrap().insert(asset_url(id, "png"));
    }

    pub fn heal_asset(&self, id: u64) {
        self.failing_assets.lock().unwrap().remove(&asset_url(id, "png"));
    }

    pub fn fail_listing(&self, error: RemoteError) {
        *self.listing_error.lock().unwrap() = Some(error);
    }

    /// Every asset download takes `delay` before answering
    pub fn slow_assets(&self, delay: Duration) {
        *self.asset_delay.lock().unwrap() = Some(delay);
    }

    pub fn asset_calls(&self) -> usize {
        self.asset_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IPostListing for FakeBoard {
    async fn resolve_tag(&self, tag: &Tag) -> Result<Option<u64>, RemoteError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tags
            .lock()
            .unwrap()
            .get(tag.as_str())
            .map(|posts| posts.len() as u64))
    }

    async fn fetch_page(
        &self,
        tag: &Tag,
        cursor: PageCursor,
    ) -> Result<Vec<PostRecord>, RemoteError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.listing_error.lock().unwrap().clone() {
            return Err(err);
        }

        let tags = self.tags.lock().unwrap();
        let Some(posts) = tags.get(tag.as_str()) else {
            return Ok(vec![]);
        };
        Ok(posts
            .iter()
            .filter(|p| match cursor {
                PageCursor::First => true,
                PageCursor::Before(id) => p.id < id,
            })
            .take(self.page_size)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl IAssetFetcher for FakeBoard {
    async fn fetch_asset(&self, asset: &AssetRef) -> Result<Vec<u8>, RemoteError> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.asset_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_assets.lock().unwrap().contains(&asset.url) {
            return Err(RemoteError::Rejected {
                status: 404,
                message: asset.url.clone(),
            });
        }
        Ok(format!("image:{}", asset.url).into_bytes())
    }
}

/// An index whose reads always fail
pub struct UnreadableIndex;

#[async_trait::async_trait]
impl IArchiveIndex for UnreadableIndex {
    async fn lookup(&self, _post_id: PostId) -> anyhow::Result<Option<ArchiveEntry>> {
        anyhow::bail!("database is locked")
    }

    async fn upsert(&self, _entry: &ArchiveEntry) -> anyhow::Result<()> {
        anyhow::bail!("database is locked")
    }

    async fn record_tag(&self, _post_id: PostId, _tag: &Tag) -> anyhow::Result<bool> {
        anyhow::bail!("database is locked")
    }

    async fn entries_for_tag(&self, _tag: &Tag) -> anyhow::Result<Vec<ArchiveEntry>> {
        anyhow::bail!("database is locked")
    }

    async fn count(&self) -> anyhow::Result<IndexCounts> {
        anyhow::bail!("database is locked")
    }
}

pub fn asset_url(id: u64, ext: &str) -> String {
    format!("https://cdn.test/{id}.{ext}")
}

pub fn post(id: u64, ext: &str) -> PostRecord {
    let mut metadata = serde_json::Map::new();
    metadata.insert("id".into(), id.into());
    metadata.insert("md5".into(), format!("md5-{id}").into());
    PostRecord {
        id: PostId::new(id),
        checksum: Checksum::new(format!("md5-{id}")).unwrap(),
        asset: Some(AssetRef {
            url: asset_url(id, ext),
            extension: ext.into(),
        }),
        rating: Some("g".into()),
        tags: vec!["solo".into()],
        metadata,
    }
}

pub fn tag(name: &str) -> Tag {
    Tag::new(name).unwrap()
}

/// Engine over `board` and `index` writing under `root`, never sleeping
pub fn engine(board: &Arc<FakeBoard>, index: Arc<dyn IArchiveIndex>, root: &Path) -> SyncEngine {
    let listing: Arc<dyn IPostListing> = board.clone();
    let assets: Arc<dyn IAssetFetcher> = board.clone();
    SyncEngine::new(listing, assets, index, root.to_path_buf())
        .with_retry_policy(RetryPolicy::immediate(3))
}

pub fn memory_index() -> Arc<InMemoryArchiveIndex> {
    Arc::new(InMemoryArchiveIndex::new())
}

/// Every file below `dir`, recursively
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        let Ok(read) = std::fs::read_dir(&d) else {
            continue;
        };
        for entry in read.filter_map(Result::ok) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}
