//! Tag synchronization engine
//!
//! The [`SyncEngine`] runs each [`TagRequest`] through the per-tag state
//! machine:
//!
//! ```text
//! Listing -> Diffing -> Materializing -> Listing -> ... -> Done
//!    \__________\______________\____________________-> Failed
//! ```
//!
//! 1. **Listing**: fetch the next page through the [`TagPager`].
//! 2. **Diffing**: compare every post against the archive index; up to
//!    date posts are counted and skipped without any download.
//! 3. **Materializing**: write needed posts one at a time and upsert their
//!    entries, files first and index second.
//!
//! Post-level failures are recorded and the tag carries on. Tag-level
//! failures (invalid tag, exhausted retries, cancellation) end the tag in
//! `Failed`; entries already written stay in the index.
//!
//! Several tags may run at once. They share the archive index and the
//! rate limiter behind the remote ports; a post listed by two tags is
//! serialized through a per-post lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use portabooru_core::config::{ArchiveConfig, Config, MAX_CONCURRENT_TAGS};
use portabooru_core::domain::{
    needs_sync, PostId, PostRecord, RetryPolicy, SyncError, SyncNeed, SyncReport, TagOutcome,
    TagRequest, TagSyncState,
};
use portabooru_core::ports::{IArchiveIndex, IAssetFetcher, IPostListing};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::listing::{verify_tag, TagPager};
use crate::materializer::Materializer;

// ============================================================================
// PostLocks
// ============================================================================

/// Async locks keyed by post ID
#[derive(Debug, Default)]
pub struct PostLocks {
    locks: DashMap<PostId, Arc<Mutex<()>>>,
}

impl PostLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `post_id`
    pub async fn lock(&self, post_id: PostId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(post_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drops locks nobody holds or waits for
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// What the diff decided for one listed post
enum Triage {
    /// Needs materializing for the given reason
    Needed(SyncNeed),
    /// Already archived and unchanged
    Skipped,
    /// Required asset is not exposed by the board
    Unavailable,
    /// Asset extension excluded by configuration
    Forbidden,
    /// The index could not be read; already recorded as a post failure
    Failed,
}

/// Orchestrates listing, diffing and materialization of tag requests
pub struct SyncEngine {
    listing: Arc<dyn IPostListing>,
    index: Arc<dyn IArchiveIndex>,
    materializer: Materializer,
    retry: RetryPolicy,
    verify_tags: bool,
    max_concurrent_tags: usize,
    locks: PostLocks,
}

impl SyncEngine {
    /// Creates an engine writing under `root` with default settings
    pub fn new(
        listing: Arc<dyn IPostListing>,
        assets: Arc<dyn IAssetFetcher>,
        index: Arc<dyn IArchiveIndex>,
        root: PathBuf,
    ) -> Self {
        let archive = ArchiveConfig {
            root,
            ..ArchiveConfig::default()
        };
        let retry = RetryPolicy::default();
        Self {
            listing,
            index,
            materializer: Materializer::new(archive, assets, retry),
            retry,
            verify_tags: true,
            max_concurrent_tags: 1,
            locks: PostLocks::new(),
        }
    }

    /// Creates an engine from the loaded configuration
    pub fn from_config(
        config: &Config,
        listing: Arc<dyn IPostListing>,
        assets: Arc<dyn IAssetFetcher>,
        index: Arc<dyn IArchiveIndex>,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            listing,
            index,
            materializer: Materializer::new(config.archive.clone(), assets, retry),
            retry,
            verify_tags: config.remote.verify_tags,
            max_concurrent_tags: config.sync.max_concurrent_tags.clamp(1, MAX_CONCURRENT_TAGS),
            locks: PostLocks::new(),
        }
    }

    /// Retry policy for listing and asset requests
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self.materializer = self.materializer.with_retry_policy(retry);
        self
    }

    /// Asset extensions never written to the archive
    pub fn with_forbidden_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.materializer = self.materializer.with_forbidden_extensions(extensions);
        self
    }

    /// Whether plain tags are checked against the board before listing
    pub fn with_tag_verification(mut self, verify: bool) -> Self {
        self.verify_tags = verify;
        self
    }

    /// Number of tags synced concurrently, between 1 and [`MAX_CONCURRENT_TAGS`]
    pub fn with_max_concurrent_tags(mut self, n: usize) -> Self {
        self.max_concurrent_tags = n.clamp(1, MAX_CONCURRENT_TAGS);
        self
    }

    pub fn max_concurrent_tags(&self) -> usize {
        self.max_concurrent_tags
    }

    pub fn index(&self) -> &Arc<dyn IArchiveIndex> {
        &self.index
    }

    /// Synchronizes every request and reports one outcome per request
    ///
    /// Outcomes are in request order. A failing tag never stops the others.
    #[instrument(skip_all, fields(tags = requests.len()))]
    pub async fn sync(&self, requests: &[TagRequest], cancel: &CancellationToken) -> SyncReport {
        let started = Instant::now();
        let mut report = SyncReport::start();
        info!(
            run_id = %report.run_id,
            tags = requests.len(),
            concurrency = self.max_concurrent_tags,
            "Sync run started"
        );

        report.outcomes = stream::iter(requests)
            .map(|request| self.sync_tag(request, cancel))
            .buffered(self.max_concurrent_tags)
            .collect()
            .await;
        report.duration_ms = started.elapsed().as_millis() as u64;
        self.locks.prune();

        info!(
            run_id = %report.run_id,
            duration_ms = report.duration_ms,
            materialized = report.total_materialized(),
            failed_tags = report.failed_tags().count(),
            post_failures = report.total_post_failures(),
            "Sync run finished"
        );
        report
    }

    /// Synchronizes a single tag request
    #[instrument(skip_all, fields(tag = %request.tag, policy = %request.policy))]
    pub async fn sync_tag(&self, request: &TagRequest, cancel: &CancellationToken) -> TagOutcome {
        let mut outcome = TagOutcome::new(request);

        match self.run_tag(request, cancel, &mut outcome).await {
            Ok(()) => {
                advance(&mut outcome, TagSyncState::Done);
                info!(
                    pages = outcome.pages,
                    listed = outcome.listed,
                    skipped = outcome.skipped,
                    materialized = outcome.materialized,
                    upgraded = outcome.upgraded,
                    unavailable = outcome.unavailable,
                    forbidden = outcome.forbidden,
                    failures = outcome.failures.len(),
                    "Tag synced"
                );
            }
            Err(err) => {
                error!(error = %err, kind = err.kind(), pages = outcome.pages, "Tag sync failed");
                outcome.fail(err);
            }
        }
        outcome
    }

    async fn run_tag(
        &self,
        request: &TagRequest,
        cancel: &CancellationToken,
        outcome: &mut TagOutcome,
    ) -> Result<(), SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        if self.verify_tags && request.tag.is_plain() {
            let expected =
                verify_tag(self.listing.as_ref(), &request.tag, &self.retry, cancel).await?;
            info!(expected_posts = expected, "Tag resolved");
        }

        let mut pager = TagPager::new(self.listing.as_ref(), &request.tag, self.retry, cancel);
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let Some(page) = pager.next_page().await? else {
                return Ok(());
            };
            outcome.pages += 1;
            outcome.listed += page.len() as u64;
            debug!(page = outcome.pages, posts = page.len(), "Page listed");

            advance(outcome, TagSyncState::Diffing);
            let mut needed = Vec::new();
            for post in page {
                match self.triage(&post, request, outcome).await {
                    Triage::Needed(need) => needed.push((post, need)),
                    Triage::Skipped => outcome.skipped += 1,
                    Triage::Unavailable => outcome.unavailable += 1,
                    Triage::Forbidden => outcome.forbidden += 1,
                    Triage::Failed => {}
                }
            }

            if !needed.is_empty() {
                advance(outcome, TagSyncState::Materializing);
                for (post, need) in needed {
                    if cancel.is_cancelled() {
                        return Err(SyncError::Cancelled);
                    }
                    self.materialize_one(&post, need, request, cancel, outcome)
                        .await?;
                }
            }
            advance(outcome, TagSyncState::Listing);
        }
    }

    /// Decides what to do with one listed post
    ///
    /// Index read failures are recorded as post failures and the post is
    /// left alone for this run.
    async fn triage(
        &self,
        post: &PostRecord,
        request: &TagRequest,
        outcome: &mut TagOutcome,
    ) -> Triage {
        if self.materializer.is_forbidden(post) {
            debug!(post_id = %post.id, extension = ?post.extension(), "Forbidden extension");
            return Triage::Forbidden;
        }

        let entry = match self.index.lookup(post.id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Archive index lookup failed");
                outcome.record_failure(post.id, index_error(post.id, &e));
                return Triage::Failed;
            }
        };

        let need = needs_sync(entry.as_ref(), post, request.policy);
        if !need.is_needed() {
            if entry.is_some_and(|e| !e.has_tag(&request.tag)) {
                let _guard = self.locks.lock(post.id).await;
                self.record_provenance(post.id, request, outcome).await;
            }
            return Triage::Skipped;
        }

        if request.policy.requires_asset() && !post.has_asset() {
            debug!(post_id = %post.id, "Asset not exposed by the board");
            return Triage::Unavailable;
        }

        Triage::Needed(need)
    }

    /// Materializes one post under its lock and indexes the result
    ///
    /// Only cancellation is returned as an error; everything else is
    /// recorded on the outcome.
    async fn materialize_one(
        &self,
        post: &PostRecord,
        planned: SyncNeed,
        request: &TagRequest,
        cancel: &CancellationToken,
        outcome: &mut TagOutcome,
    ) -> Result<(), SyncError> {
        let _guard = self.locks.lock(post.id).await;

        // Another tag may have written the post while we waited
        let entry = match self.index.lookup(post.id).await {
            Ok(entry) => entry,
            Err(e) => {
                outcome.record_failure(post.id, index_error(post.id, &e));
                return Ok(());
            }
        };
        let need = needs_sync(entry.as_ref(), post, request.policy);
        if !need.is_needed() {
            debug!(post_id = %post.id, ?planned, "Post synced concurrently, skipping");
            outcome.skipped += 1;
            if entry.is_some_and(|e| !e.has_tag(&request.tag)) {
                self.record_provenance(post.id, request, outcome).await;
            }
            return Ok(());
        }

        let new_entry = match self
            .materializer
            .materialize(post, request, entry.as_ref(), cancel)
            .await
        {
            Ok(new_entry) => new_entry,
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(err) => {
                warn!(post_id = %post.id, error = %err, "Post materialization failed");
                outcome.record_failure(post.id, err);
                return Ok(());
            }
        };

        if let Err(e) = self.index.upsert(&new_entry).await {
            warn!(post_id = %post.id, error = %e, "Archive index upsert failed");
            outcome.record_failure(post.id, index_error(post.id, &e));
            return Ok(());
        }

        outcome.materialized += 1;
        if need == SyncNeed::AssetMissing {
            outcome.upgraded += 1;
        }
        debug!(
            post_id = %post.id,
            reason = ?need,
            asset = new_entry.asset_present(),
            "Post materialized"
        );
        Ok(())
    }

    /// Adds the request's tag to an existing entry
    ///
    /// Callers hold the post's lock, so a concurrent materialization of the
    /// same post cannot overwrite the new tag with its older tag set.
    async fn record_provenance(
        &self,
        post_id: PostId,
        request: &TagRequest,
        outcome: &mut TagOutcome,
    ) {
        if let Err(e) = self.index.record_tag(post_id, &request.tag).await {
            warn!(post_id = %post_id, error = %e, "Could not record provenance tag");
            outcome.record_failure(post_id, index_error(post_id, &e));
        }
    }
}

fn index_error(post_id: PostId, err: &anyhow::Error) -> SyncError {
    SyncError::Storage {
        post_id: post_id.value(),
        reason: format!("archive index: {err:#}"),
    }
}

/// Moves the tag to `next`, logging transitions the state machine refuses
fn advance(outcome: &mut TagOutcome, next: TagSyncState) {
    if let Err(e) = outcome.state.transition_to(next) {
        error!(error = %e, "Unexpected tag state transition");
        outcome.state = next;
    }
}
