//! Tag requests and their download policy
//!
//! The tag list uses a leading `*` to mark a tag as metadata-only. That
//! convention is parsed once here; everything downstream sees a typed
//! [`SyncPolicy`].

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::Tag;

/// Marker prefix selecting [`SyncPolicy::MetadataOnly`]
pub const METADATA_ONLY_MARKER: char = '*';

/// What to persist for each post of a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Binary asset plus metadata
    Full,
    /// Structured metadata only, no asset download
    MetadataOnly,
}

impl SyncPolicy {
    /// Returns true if this policy requires the binary asset on disk
    pub fn requires_asset(&self) -> bool {
        matches!(self, SyncPolicy::Full)
    }
}

impl Display for SyncPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncPolicy::Full => write!(f, "full"),
            SyncPolicy::MetadataOnly => write!(f, "metadata-only"),
        }
    }
}

/// A tag to synchronize together with its policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRequest {
    pub tag: Tag,
    pub policy: SyncPolicy,
}

impl TagRequest {
    /// Create a request from an already-validated tag
    pub fn new(tag: Tag, policy: SyncPolicy) -> Self {
        Self { tag, policy }
    }

    /// Parse one line of a tag list
    ///
    /// `*arknights` becomes a metadata-only request for `arknights`;
    /// anything else is a full request.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidTag`] if nothing is left after the marker
    pub fn parse(line: &str) -> Result<Self, DomainError> {
        let line = line.trim();
        match line.strip_prefix(METADATA_ONLY_MARKER) {
            Some(rest) => Ok(Self::new(Tag::new(rest)?, SyncPolicy::MetadataOnly)),
            None => Ok(Self::new(Tag::new(line)?, SyncPolicy::Full)),
        }
    }
}

impl Display for TagRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tag, self.policy)
    }
}

/// Parse a whole tag list, one request per line
///
/// Blank lines and lines starting with `#` are ignored. When the same tag
/// appears more than once, the first occurrence wins.
///
/// # Errors
/// Returns the first invalid line as [`DomainError::InvalidTag`], prefixed
/// with its 1-based line number
pub fn parse_tag_list(text: &str) -> Result<Vec<TagRequest>, DomainError> {
    let mut seen = HashSet::new();
    let mut requests = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let request = TagRequest::parse(trimmed)
            .map_err(|e| DomainError::InvalidTag(format!("line {}: {e}", index + 1)))?;

        if seen.insert(request.tag.clone()) {
            requests.push(request);
        }
    }

    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let req = TagRequest::parse("furina_(genshin_impact)").unwrap();
        assert_eq!(req.tag.as_str(), "furina_(genshin_impact)");
        assert_eq!(req.policy, SyncPolicy::Full);
    }

    #[test]
    fn test_parse_metadata_only() {
        let req = TagRequest::parse("*arknights").unwrap();
        assert_eq!(req.tag.as_str(), "arknights");
        assert_eq!(req.policy, SyncPolicy::MetadataOnly);
    }

    #[test]
    fn test_parse_marker_with_whitespace() {
        let req = TagRequest::parse("  * arknights  ").unwrap();
        assert_eq!(req.tag.as_str(), "arknights");
        assert_eq!(req.policy, SyncPolicy::MetadataOnly);
    }

    #[test]
    fn test_parse_bare_marker_rejected() {
        assert!(TagRequest::parse("*").is_err());
    }

    #[test]
    fn test_policy_requires_asset() {
        assert!(SyncPolicy::Full.requires_asset());
        assert!(!SyncPolicy::MetadataOnly.requires_asset());
    }

    #[test]
    fn test_parse_tag_list_skips_blank_and_comments() {
        let text = "# my tags\n\nfurina_(genshin_impact)\n*arknights\n   \n";
        let requests = parse_tag_list(text).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].policy, SyncPolicy::Full);
        assert_eq!(requests[1].tag.as_str(), "arknights");
        assert_eq!(requests[1].policy, SyncPolicy::MetadataOnly);
    }

    #[test]
    fn test_parse_tag_list_keeps_first_duplicate() {
        let requests = parse_tag_list("*arknights\narknights\n").unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].policy, SyncPolicy::MetadataOnly);
    }

    #[test]
    fn test_parse_tag_list_reports_line_number() {
        let err = parse_tag_list("ok\n*\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_display() {
        let req = TagRequest::parse("*arknights").unwrap();
        assert_eq!(req.to_string(), "arknights (metadata-only)");
    }
}
