//! Post materializer
//!
//! Writes one post to the archive directory and returns the
//! [`ArchiveEntry`] describing it. The caller upserts that entry into the
//! index; nothing here touches the index.
//!
//! ## Layout
//!
//! ```text
//! <root>/<tag directory>/<rating>/<id>_infos.json
//! <root>/<tag directory>/<rating>/<id>_tags.txt
//! <root>/<tag directory>/<rating>/<id>_image.<ext>   (full policy only)
//! ```
//!
//! A post already in the archive is rewritten into the directory recorded
//! in its entry, whichever tag it is now seen under.
//!
//! ## Atomicity
//!
//! Every file is first written and fsynced to a hidden `.part` file next to
//! its final path. Renames start only once every file of the post is
//! staged. [`StagedFiles`] removes leftover `.part` files when dropped, so
//! an early return or a panic never leaves a half-written file behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use portabooru_core::config::ArchiveConfig;
use portabooru_core::domain::{ArchiveEntry, PostRecord, RetryPolicy, SyncError, TagRequest};
use portabooru_core::ports::IAssetFetcher;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::retry::{with_retry, RetryFailure};

// ============================================================================
// StagedFiles
// ============================================================================

/// Staging files of one post, removed on drop unless committed
#[derive(Debug, Default)]
pub struct StagedFiles {
    /// (staging path, final path), in staging order
    pending: Vec<(PathBuf, PathBuf)>,
}

impl StagedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Staging path for `target`: `.<name>.<uuid>.part` in the same directory
    fn staging_path(target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.with_file_name(format!(".{name}.{}.part", Uuid::new_v4()))
    }

    /// Writes `data` to a staging file for `target` and syncs it to disk
    pub async fn stage(&mut self, target: &Path, data: &[u8]) -> std::io::Result<()> {
        let staging = Self::staging_path(target);
        // Registered before writing so a failed write is cleaned up too
        self.pending.push((staging.clone(), target.to_path_buf()));

        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Renames every staged file into place
    pub async fn commit(mut self) -> std::io::Result<()> {
        while let Some((staging, target)) = self.pending.first().cloned() {
            tokio::fs::rename(&staging, &target).await?;
            self.pending.remove(0);
        }
        Ok(())
    }

    /// Staging files not yet renamed
    pub fn pending(&self) -> impl Iterator<Item = &Path> {
        self.pending.iter().map(|(staging, _)| staging.as_path())
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        for (staging, _) in self.pending.drain(..) {
            match std::fs::remove_file(&staging) {
                Ok(()) => debug!(path = %staging.display(), "Removed staging file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %staging.display(), error = %e, "Could not remove staging file")
                }
            }
        }
    }
}

// ============================================================================
// Materializer
// ============================================================================

/// Writes posts to the archive directory
pub struct Materializer {
    archive: ArchiveConfig,
    assets: Arc<dyn IAssetFetcher>,
    retry: RetryPolicy,
}

impl Materializer {
    pub fn new(archive: ArchiveConfig, assets: Arc<dyn IAssetFetcher>, retry: RetryPolicy) -> Self {
        Self {
            archive,
            assets,
            retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_forbidden_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archive.forbidden_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.archive.root
    }

    /// Returns true if the post's asset extension is excluded by configuration
    pub fn is_forbidden(&self, post: &PostRecord) -> bool {
        post.extension()
            .is_some_and(|ext| self.archive.is_forbidden(&ext))
    }

    /// Directory a post is written to
    pub fn directory_for(
        &self,
        post: &PostRecord,
        request: &TagRequest,
        existing: Option<&ArchiveEntry>,
    ) -> PathBuf {
        match existing {
            Some(entry) => entry.directory.clone(),
            None => self
                .archive
                .root
                .join(request.tag.directory_name())
                .join(post.rating_dir()),
        }
    }

    /// Writes `post` under `request` and returns its new archive entry
    ///
    /// The asset is fetched when the policy requires it, or when the
    /// existing entry already has one (so a changed post does not keep a
    /// stale asset). Provenance tags of `existing` are carried over and
    /// the requesting tag is added.
    ///
    /// # Errors
    /// - [`SyncError::Download`] if the asset cannot be fetched
    /// - [`SyncError::Storage`] if any file cannot be written
    /// - [`SyncError::Cancelled`] if the run is cancelled during a retry wait
    #[instrument(skip_all, fields(post_id = %post.id, tag = %request.tag))]
    pub async fn materialize(
        &self,
        post: &PostRecord,
        request: &TagRequest,
        existing: Option<&ArchiveEntry>,
        cancel: &CancellationToken,
    ) -> Result<ArchiveEntry, SyncError> {
        let post_id = post.id.value();
        let storage = |e: &dyn std::fmt::Display| SyncError::Storage {
            post_id,
            reason: e.to_string(),
        };

        let directory = self.directory_for(post, request, existing);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| storage(&format!("{}: {e}", directory.display())))?;

        let existing_asset = existing.and_then(|e| e.asset_path.clone());
        let wants_asset = request.policy.requires_asset() || existing_asset.is_some();

        let asset = match (&post.asset, wants_asset) {
            (Some(asset), true) => {
                let bytes = with_retry(&self.retry, "fetch_asset", cancel, || {
                    self.assets.fetch_asset(asset)
                })
                .await
                .map_err(|f| match f {
                    RetryFailure::Cancelled => SyncError::Cancelled,
                    other => SyncError::Download {
                        post_id,
                        reason: other.to_string(),
                    },
                })?;
                let path = directory.join(format!("{post_id}_image.{}", asset.file_extension()));
                Some((path, bytes))
            }
            (None, true) if request.policy.requires_asset() => {
                return Err(SyncError::Download {
                    post_id,
                    reason: "post exposes no asset".into(),
                });
            }
            _ => None,
        };

        let metadata = serde_json::to_vec_pretty(&post.metadata).map_err(|e| storage(&e))?;
        let metadata_path = directory.join(format!("{post_id}_infos.json"));
        let tags_path = directory.join(format!("{post_id}_tags.txt"));

        let mut staged = StagedFiles::new();
        if let Some((path, bytes)) = &asset {
            staged
                .stage(path, bytes)
                .await
                .map_err(|e| storage(&format!("{}: {e}", path.display())))?;
        }
        staged
            .stage(&tags_path, post.tags_text().as_bytes())
            .await
            .map_err(|e| storage(&format!("{}: {e}", tags_path.display())))?;
        staged
            .stage(&metadata_path, &metadata)
            .await
            .map_err(|e| storage(&format!("{}: {e}", metadata_path.display())))?;
        staged.commit().await.map_err(|e| storage(&e))?;

        let asset_path = match asset {
            Some((path, bytes)) => {
                if let Some(old) = existing_asset.as_ref().filter(|old| **old != path) {
                    remove_replaced(old).await;
                }
                debug!(bytes = bytes.len(), path = %path.display(), "Asset written");
                Some(path)
            }
            // A post that stops exposing its asset keeps the one on disk
            None => existing_asset,
        };

        let mut tags = existing.map(|e| e.tags.clone()).unwrap_or_default();
        tags.insert(request.tag.clone());

        Ok(ArchiveEntry {
            post_id: post.id,
            checksum: post.checksum.clone(),
            directory,
            metadata_path,
            tags_path,
            asset_path,
            tags,
            synced_at: Utc::now(),
        })
    }
}

/// Removes an asset replaced by one with a different extension
async fn remove_replaced(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed replaced asset"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove replaced asset"),
    }
}
