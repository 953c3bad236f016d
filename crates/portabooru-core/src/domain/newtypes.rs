//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// PostId
// ============================================================================

/// Numeric identifier of a post on the remote board
///
/// Post IDs are unique across the whole board, which is why the archive
/// index is keyed by them rather than by (tag, post) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(u64);

impl PostId {
    /// Create a PostId from its numeric value
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl Display for PostId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PostId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidPostId(format!("{s}: {e}")))
    }
}

impl From<u64> for PostId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Tag
// ============================================================================

/// Characters that cannot appear in a directory name on common filesystems
const FORBIDDEN_PATH_CHARS: &[char] = &['<', '>', ':', '"', '\\', '|', '?', '*', '/'];

/// A search tag (or tag query) sent to the remote board
///
/// The value is trimmed and must be non-empty. Internal spaces are allowed
/// because the board accepts multi-tag queries, but control characters are not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Create a new Tag
    ///
    /// # Errors
    /// Returns error if the tag is empty after trimming or contains control characters
    pub fn new(tag: impl Into<String>) -> Result<Self, DomainError> {
        let tag = tag.into();
        let trimmed = tag.trim();

        if trimmed.is_empty() {
            return Err(DomainError::InvalidTag("Tag cannot be empty".to_string()));
        }

        if trimmed.chars().any(char::is_control) {
            return Err(DomainError::InvalidTag(format!(
                "Tag contains control characters: {trimmed:?}"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for a single plain tag name
    ///
    /// Plain tags can be looked up in the tag catalogue. Multi-tag queries,
    /// metatags (`rating:g`, `order:score`) and wildcards cannot.
    pub fn is_plain(&self) -> bool {
        !self
            .0
            .chars()
            .any(|c| c.is_whitespace() || c == ':' || c == '*')
    }

    /// Directory name used when this tag first materializes a post
    ///
    /// Every character that is unsafe in a path component is replaced by `_`.
    pub fn directory_name(&self) -> String {
        self.0
            .chars()
            .map(|c| if FORBIDDEN_PATH_CHARS.contains(&c) { '_' } else { c })
            .collect()
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

// ============================================================================
// Checksum
// ============================================================================

/// Content checksum or version marker of a post
///
/// Opaque to the sync engine: two checksums are only ever compared for
/// equality. Typically the board's MD5 of the asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

impl Checksum {
    /// Create a new Checksum
    ///
    /// # Errors
    /// Returns error if the checksum is empty
    pub fn new(checksum: impl Into<String>) -> Result<Self, DomainError> {
        let checksum = checksum.into();
        if checksum.trim().is_empty() {
            return Err(DomainError::InvalidChecksum(
                "Checksum cannot be empty".to_string(),
            ));
        }
        Ok(Self(checksum))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Checksum {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.0
    }
}
