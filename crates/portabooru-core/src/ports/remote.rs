//! Remote board ports (driven/secondary ports)
//!
//! ## Design Notes
//!
//! - Unlike the archive port, remote calls return a classified
//!   [`RemoteError`]: the retry executor needs to know whether a failure is
//!   transient and how long the server asked it to wait.
//! - Each call is a single request. Retrying is the caller's business.

use std::time::Duration;

use thiserror::Error;

use crate::domain::{AssetRef, PostId, PostRecord, Tag};

// ============================================================================
// RemoteError
// ============================================================================

/// Classified failure of a single remote request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// HTTP 429, optionally with the server's requested wait
    #[error("Rate limited by remote (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 401/403, credentials rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other 4xx (bad tag query, missing resource)
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Returns true if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::RateLimited { .. } | RemoteError::Server { .. } | RemoteError::Network(_)
        )
    }

    /// Wait requested by the server, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

// ============================================================================
// PageCursor
// ============================================================================

/// Position in a tag listing
///
/// The first page is requested by number; every following page is requested
/// relative to the lowest post ID already seen, so posts uploaded while the
/// walk is in progress cannot shift the pages underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    First,
    Before(PostId),
}

impl PageCursor {
    /// Value of the board's `page` query parameter
    pub fn as_query(&self) -> String {
        match self {
            PageCursor::First => "1".to_string(),
            PageCursor::Before(id) => format!("b{id}"),
        }
    }
}

// ============================================================================
// IPostListing
// ============================================================================

/// Paginated tag search
#[async_trait::async_trait]
pub trait IPostListing: Send + Sync {
    /// Look up a plain tag in the board's tag catalogue
    ///
    /// Returns the tag's post count, or `None` if the board does not know
    /// the tag.
    async fn resolve_tag(&self, tag: &Tag) -> Result<Option<u64>, RemoteError>;

    /// Fetch one page of posts for `tag`, newest first
    ///
    /// An empty page is the natural end of the listing.
    async fn fetch_page(&self, tag: &Tag, cursor: PageCursor)
        -> Result<Vec<PostRecord>, RemoteError>;
}

// ============================================================================
// IAssetFetcher
// ============================================================================

/// Binary asset download
#[async_trait::async_trait]
pub trait IAssetFetcher: Send + Sync {
    /// Download the full content of `asset`
    async fn fetch_asset(&self, asset: &AssetRef) -> Result<Vec<u8>, RemoteError>;
}
