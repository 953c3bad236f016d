//! Portabooru Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `TagRequest`, `PostRecord`, `ArchiveEntry`, `SyncReport`
//! - **Error taxonomy** - `SyncError` (tag-level and post-level failures)
//! - **Retry policy** - `RetryPolicy`, an explicit backoff value passed to adapters
//! - **Port definitions** - Traits for adapters: `IPostListing`, `IAssetFetcher`, `IArchiveIndex`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`portabooru-api` for the remote board, `portabooru-archive` for the index).
//! The orchestration lives in `portabooru-sync`.

pub mod config;
pub mod domain;
pub mod ports;
