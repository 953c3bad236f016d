//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync engine depends on; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IPostListing`] - Paginated tag search against the remote board
//! - [`IAssetFetcher`] - Binary asset download
//! - [`IArchiveIndex`] - Durable post ID to archive entry mapping

pub mod archive_index;
pub mod remote;

pub use archive_index::{IArchiveIndex, IndexCounts};
pub use remote::{IAssetFetcher, IPostListing, PageCursor, RemoteError};
