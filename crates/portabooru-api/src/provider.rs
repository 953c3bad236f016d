//! DanbooruProvider - listing and asset ports for the Danbooru API
//!
//! Wraps the [`BooruClient`] and fulfils the [`IPostListing`] and
//! [`IAssetFetcher`] port contracts.
//!
//! ## Design Notes
//!
//! - Each port call is exactly one HTTP request. Backoff and retry belong to
//!   the sync crate so that a single [`RetryPolicy`] governs both listing and
//!   asset downloads.
//! - Errors are converted from [`ApiError`](crate::ApiError) into the port's
//!   [`RemoteError`] with `?`.
//!
//! [`RetryPolicy`]: portabooru_core::domain::RetryPolicy

use std::sync::Arc;

use portabooru_core::config::MAX_PAGE_SIZE;
use portabooru_core::domain::{AssetRef, PostRecord, Tag};
use portabooru_core::ports::{IAssetFetcher, IPostListing, PageCursor, RemoteError};
use tracing::debug;

use crate::client::BooruClient;
use crate::posts::{parse_posts, parse_tag_count};

/// Listing endpoint
const POSTS_PATH: &str = "/posts.json";

/// Tag catalogue endpoint
const TAGS_PATH: &str = "/tags.json";

/// Danbooru implementation of the remote ports
#[derive(Clone)]
pub struct DanbooruProvider {
    client: Arc<BooruClient>,
    page_size: u32,
}

impl DanbooruProvider {
    /// Creates a provider requesting `page_size` posts per page (capped at 200)
    pub fn new(client: Arc<BooruClient>, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn client(&self) -> &Arc<BooruClient> {
        &self.client
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

#[async_trait::async_trait]
impl IPostListing for DanbooruProvider {
    async fn resolve_tag(&self, tag: &Tag) -> Result<Option<u64>, RemoteError> {
        let body = self
            .client
            .get_body(TAGS_PATH, &[("search[name]", tag.as_str())])
            .await?;
        let count = parse_tag_count(&body, tag.as_str())?;
        debug!(tag = %tag, post_count = ?count, "Resolved tag");
        Ok(count)
    }

    async fn fetch_page(
        &self,
        tag: &Tag,
        cursor: PageCursor,
    ) -> Result<Vec<PostRecord>, RemoteError> {
        let limit = self.page_size.to_string();
        let page = cursor.as_query();
        let body = self
            .client
            .get_body(
                POSTS_PATH,
                &[
                    ("tags", tag.as_str()),
                    ("limit", limit.as_str()),
                    ("page", page.as_str()),
                ],
            )
            .await?;
        let posts = parse_posts(&body)?;
        debug!(tag = %tag, page = %page, count = posts.len(), "Fetched listing page");
        Ok(posts)
    }
}

#[async_trait::async_trait]
impl IAssetFetcher for DanbooruProvider {
    async fn fetch_asset(&self, asset: &AssetRef) -> Result<Vec<u8>, RemoteError> {
        Ok(self.client.download(&asset.url).await?)
    }
}
