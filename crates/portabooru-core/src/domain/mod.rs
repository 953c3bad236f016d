//! Domain entities and business logic
//!
//! This module contains the core domain types for Portabooru:
//! - Newtypes for post identifiers, tags and checksums
//! - Tag requests and their download policy
//! - Post records as listed by the remote board
//! - Archive entries (the durable record of what was synced)
//! - Per-tag outcomes and the run report
//! - Retry policy values
//! - Domain-specific error types

pub mod archive_entry;
pub mod credentials;
pub mod errors;
pub mod newtypes;
pub mod outcome;
pub mod post;
pub mod retry;
pub mod tag_request;

// Re-export commonly used types
pub use archive_entry::{needs_sync, ArchiveEntry, SyncNeed};
pub use credentials::Credentials;
pub use errors::{DomainError, SyncError};
pub use newtypes::*;
pub use outcome::{PostFailure, SyncReport, TagOutcome, TagSyncState};
pub use post::{AssetRef, PostRecord, FALLBACK_EXTENSION};
pub use retry::RetryPolicy;
pub use tag_request::{parse_tag_list, SyncPolicy, TagRequest};
