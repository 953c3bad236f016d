//! Domain error types
//!
//! This module defines two families of errors:
//! - [`DomainError`] for validation failures and invalid state transitions
//! - [`SyncError`] for the sync taxonomy surfaced in the outcome summary

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Tag string is empty or contains characters the board rejects
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// Post identifier could not be parsed
    #[error("Invalid post ID: {0}")]
    InvalidPostId(String),

    /// Checksum is empty
    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Failure taxonomy of a sync run
///
/// `InvalidTag`, `TransientFetch` and `Cancelled` abort a single tag.
/// `Download` and `Storage` concern one post; the tag carries on with the
/// next post and the failure is reported in the tag outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncError {
    /// The tag is unknown, malformed, or the credentials were rejected
    #[error("Invalid tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    /// Listing kept failing transiently until the retry budget ran out
    #[error("Transient fetch failure after {attempts} attempts: {reason}")]
    TransientFetch { attempts: u32, reason: String },

    /// The binary asset of a post could not be fetched
    #[error("Download failed for post {post_id}: {reason}")]
    Download { post_id: u64, reason: String },

    /// Writing a post to local storage or the index failed
    #[error("Storage failed for post {post_id}: {reason}")]
    Storage { post_id: u64, reason: String },

    /// The run was cancelled before the tag finished
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns true if this error aborts the whole tag
    pub fn is_tag_level(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidTag { .. } | SyncError::TransientFetch { .. } | SyncError::Cancelled
        )
    }

    /// Returns the post this error concerns, for post-level errors
    pub fn post_id(&self) -> Option<u64> {
        match self {
            SyncError::Download { post_id, .. } | SyncError::Storage { post_id, .. } => {
                Some(*post_id)
            }
            _ => None,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidTag { .. } => "invalid_tag",
            SyncError::TransientFetch { .. } => "transient_fetch",
            SyncError::Download { .. } => "download",
            SyncError::Storage { .. } => "storage",
            SyncError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidTag("".to_string());
        assert_eq!(err.to_string(), "Invalid tag: ");

        let err = DomainError::InvalidState {
            from: "Done".to_string(),
            to: "Listing".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid state transition from Done to Listing");

        let err = SyncError::Download {
            post_id: 42,
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(err.to_string(), "Download failed for post 42: HTTP 503");
    }

    #[test]
    fn test_sync_error_levels() {
        let invalid = SyncError::InvalidTag {
            tag: "nope".into(),
            reason: "unknown".into(),
        };
        assert!(invalid.is_tag_level());
        assert_eq!(invalid.post_id(), None);

        let storage = SyncError::Storage {
            post_id: 7,
            reason: "disk full".into(),
        };
        assert!(!storage.is_tag_level());
        assert_eq!(storage.post_id(), Some(7));
        assert!(SyncError::Cancelled.is_tag_level());
    }

    #[test]
    fn test_sync_error_serializes_with_kind_tag() {
        let err = SyncError::TransientFetch {
            attempts: 5,
            reason: "HTTP 502".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "transient_fetch");
        assert_eq!(json["attempts"], 5);
        assert_eq!(err.kind(), "transient_fetch");
    }
}
