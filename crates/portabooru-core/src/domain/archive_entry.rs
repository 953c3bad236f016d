//! Archive entries and the diff rule
//!
//! An [`ArchiveEntry`] is the durable record of one post's sync state. It is
//! written only after every file of the post is in its final location, so an
//! entry never points at a half-written file.
//!
//! [`needs_sync`] is the pure diff between a listed post, the policy it was
//! requested under, and the entry already in the index.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Checksum, PostId, Tag};
use super::post::PostRecord;
use super::tag_request::SyncPolicy;

/// Local durable record of a synced post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub post_id: PostId,
    /// Checksum of the post when it was last materialized
    pub checksum: Checksum,
    /// Directory holding the post's files
    pub directory: PathBuf,
    /// Metadata JSON file
    pub metadata_path: PathBuf,
    /// Tag list sidecar file
    pub tags_path: PathBuf,
    /// Binary asset, `None` for posts stored under the metadata-only policy
    pub asset_path: Option<PathBuf>,
    /// Tags under which this post was seen (provenance)
    pub tags: BTreeSet<Tag>,
    pub synced_at: DateTime<Utc>,
}

impl ArchiveEntry {
    /// Returns true if the binary asset is recorded as present
    pub fn asset_present(&self) -> bool {
        self.asset_path.is_some()
    }

    /// Returns true if the post was already seen under `tag`
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Adds `tag` to the provenance set; returns false if it was already there
    pub fn add_tag(&mut self, tag: Tag) -> bool {
        self.tags.insert(tag)
    }
}

/// Why a listed post does or does not need to be materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncNeed {
    /// No entry exists for the post
    New,
    /// The remote checksum differs from the one recorded
    ChecksumChanged,
    /// The entry lacks the asset but the policy requires it
    AssetMissing,
    /// Nothing to do
    UpToDate,
}

impl SyncNeed {
    /// Returns true unless the post is up to date
    pub fn is_needed(&self) -> bool {
        !matches!(self, SyncNeed::UpToDate)
    }
}

/// Decide whether `post`, requested under `policy`, must be materialized
///
/// True when no entry exists, when the recorded checksum differs, or when
/// the entry lacks the binary asset while the policy requires it. A post
/// that already has its asset is never re-fetched because the policy is
/// now metadata-only.
pub fn needs_sync(entry: Option<&ArchiveEntry>, post: &PostRecord, policy: SyncPolicy) -> SyncNeed {
    match entry {
        None => SyncNeed::New,
        Some(entry) if entry.checksum != post.checksum => SyncNeed::ChecksumChanged,
        Some(entry) if policy.requires_asset() && !entry.asset_present() => SyncNeed::AssetMissing,
        Some(_) => SyncNeed::UpToDate,
    }
}
