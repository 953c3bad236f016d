//! Paginated listing of one tag
//!
//! [`TagPager`] walks the remote listing newest first. The first request
//! asks for page 1; each following request asks for posts older than the
//! lowest ID seen so far. An empty page ends the listing.
//!
//! Remote failures are mapped onto the sync taxonomy here:
//!
//! | Remote failure                        | Sync error        |
//! |---------------------------------------|-------------------|
//! | transient, retry budget exhausted     | `TransientFetch`  |
//! | rejected request or bad credentials   | `InvalidTag`      |
//! | unparseable response                  | `InvalidTag`      |

use portabooru_core::domain::{PostId, PostRecord, RetryPolicy, SyncError, Tag};
use portabooru_core::ports::{IPostListing, PageCursor, RemoteError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::retry::{with_retry, RetryFailure};

/// Converts a failed listing call into the tag-level error it causes
pub fn listing_error(tag: &Tag, failure: RetryFailure) -> SyncError {
    match failure {
        RetryFailure::Cancelled => SyncError::Cancelled,
        RetryFailure::Exhausted { attempts, last } => SyncError::TransientFetch {
            attempts,
            reason: last.to_string(),
        },
        RetryFailure::Permanent(RemoteError::Unauthorized(message)) => SyncError::InvalidTag {
            tag: tag.to_string(),
            reason: format!("credentials rejected: {message}"),
        },
        RetryFailure::Permanent(err) => SyncError::InvalidTag {
            tag: tag.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Checks that a plain tag exists on the board
///
/// Returns the board's post count for the tag.
///
/// # Errors
/// [`SyncError::InvalidTag`] if the board does not know the tag, otherwise
/// whatever [`listing_error`] maps the failure to.
pub async fn verify_tag(
    listing: &dyn IPostListing,
    tag: &Tag,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<u64, SyncError> {
    let count = with_retry(policy, "resolve_tag", cancel, || listing.resolve_tag(tag))
        .await
        .map_err(|f| listing_error(tag, f))?;

    count.ok_or_else(|| SyncError::InvalidTag {
        tag: tag.to_string(),
        reason: "tag does not exist on the board".into(),
    })
}

// ============================================================================
// SyncCursor
// ============================================================================

/// Pagination state of one tag, kept for the duration of a run only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCursor {
    /// Pages fetched so far, the empty end page excluded
    pub pages_fetched: u32,
    /// Lowest post ID seen so far
    pub last_id: Option<PostId>,
}

impl SyncCursor {
    /// Cursor for the next page request
    pub fn next_page(&self) -> PageCursor {
        match self.last_id {
            Some(id) => PageCursor::Before(id),
            None => PageCursor::First,
        }
    }

    /// Records a fetched page; returns false if it did not move the cursor
    fn advance(&mut self, page: &[PostRecord]) -> bool {
        let Some(lowest) = page.iter().map(|p| p.id).min() else {
            return false;
        };
        self.pages_fetched += 1;
        let moved = self.last_id.map_or(true, |last| lowest < last);
        if moved {
            self.last_id = Some(lowest);
        }
        moved
    }
}

// ============================================================================
// TagPager
// ============================================================================

/// Lazy page sequence for one tag
pub struct TagPager<'a> {
    listing: &'a dyn IPostListing,
    tag: &'a Tag,
    policy: RetryPolicy,
    cancel: &'a CancellationToken,
    cursor: SyncCursor,
    finished: bool,
}

impl<'a> TagPager<'a> {
    pub fn new(
        listing: &'a dyn IPostListing,
        tag: &'a Tag,
        policy: RetryPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            listing,
            tag,
            policy,
            cancel,
            cursor: SyncCursor::default(),
            finished: false,
        }
    }

    pub fn cursor(&self) -> &SyncCursor {
        &self.cursor
    }

    /// Fetches the next page, or `None` once the listing has ended
    pub async fn next_page(&mut self) -> Result<Option<Vec<PostRecord>>, SyncError> {
        if self.finished {
            return Ok(None);
        }

        let page_cursor = self.cursor.next_page();
        let listing = self.listing;
        let tag = self.tag;
        let page = with_retry(&self.policy, "fetch_page", self.cancel, || {
            listing.fetch_page(tag, page_cursor)
        })
        .await
        .map_err(|f| listing_error(tag, f))?;

        if page.is_empty() {
            debug!(tag = %tag, pages = self.cursor.pages_fetched, "Listing ended");
            self.finished = true;
            return Ok(None);
        }

        if !self.cursor.advance(&page) {
            warn!(
                tag = %tag,
                cursor = %page_cursor.as_query(),
                "Listing did not move past the cursor, stopping"
            );
            self.finished = true;
        }

        Ok(Some(page))
    }
}
