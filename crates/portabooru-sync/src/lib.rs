//! Portabooru Sync - tag synchronization engine
//!
//! Provides:
//! - Paginated tag listing with retry and backoff
//! - Diffing against the archive index so repeated runs only fetch changes
//! - Atomic per-post materialization (metadata, tag list, asset)
//! - Concurrent tags with a per-post lock and cooperative cancellation
//!
//! ## Modules
//!
//! - [`engine`] - Sync engine running the per-tag state machine
//! - [`listing`] - Tag pager and listing error mapping
//! - [`materializer`] - Staged writes of one post to the archive directory
//! - [`retry`] - Retry executor driven by a `RetryPolicy`

pub mod engine;
pub mod listing;
pub mod materializer;
pub mod retry;

pub use engine::SyncEngine;
pub use listing::{SyncCursor, TagPager};
pub use materializer::Materializer;
pub use retry::{with_retry, RetryFailure};
