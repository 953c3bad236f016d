//! Post records as listed by the remote board
//!
//! A [`PostRecord`] is created by the listing adapter and is read-only
//! downstream. It keeps the raw JSON object alongside the handful of typed
//! fields the sync engine needs, so the metadata file on disk contains
//! everything the board returned.

use serde::{Deserialize, Serialize};

use super::newtypes::{Checksum, PostId};

/// Extension used when the board's is missing or unusable as a file name
pub const FALLBACK_EXTENSION: &str = "bin";

/// Returns `value` if it is safe as a single path component
///
/// Only non-empty ASCII alphanumeric strings qualify, which rules out
/// separators, `..` and anything else that could leave the archive root.
fn path_segment(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())).then_some(value)
}

/// Reference to the binary asset of a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Absolute download URL
    pub url: String,
    /// Expected file extension, without the leading dot
    pub extension: String,
}

impl AssetRef {
    /// Lower-cased extension for the file name, `bin` when unusable
    pub fn file_extension(&self) -> String {
        path_segment(self.extension.trim_start_matches('.'))
            .map(str::to_lowercase)
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
    }
}

/// One post as returned by a listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: PostId,
    /// Content checksum or version marker, compared for equality only
    pub checksum: Checksum,
    /// Binary asset, `None` when the board does not expose the file
    /// (deleted, banned or restricted posts)
    pub asset: Option<AssetRef>,
    /// Rating letter (`g`, `s`, `q`, `e`), when present
    pub rating: Option<String>,
    /// Tags attached to the post
    pub tags: Vec<String>,
    /// Raw metadata object as received
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PostRecord {
    /// Directory segment for this post's rating, `unrated` when unusable
    pub fn rating_dir(&self) -> &str {
        self.rating
            .as_deref()
            .and_then(path_segment)
            .unwrap_or("unrated")
    }

    /// Returns true if the asset can be downloaded
    pub fn has_asset(&self) -> bool {
        self.asset.is_some()
    }

    /// Lower-cased asset extension, if any
    pub fn extension(&self) -> Option<String> {
        self.asset.as_ref().map(AssetRef::file_extension)
    }

    /// Tag list formatted one per line, as written to the tags sidecar file
    pub fn tags_text(&self) -> String {
        let mut text = self.tags.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}
