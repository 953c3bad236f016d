//! Danbooru listing responses
//!
//! Turns the JSON returned by `/posts.json` and `/tags.json` into domain
//! values. A post record keeps the whole JSON object as its metadata so the
//! `_infos.json` file on disk holds everything the board sent.
//!
//! Records without a numeric `id` cannot be archived and are dropped here.
//! Records without a `file_url` (deleted, banned or restricted posts) are
//! kept with no asset; the sync engine decides what that means for the
//! requested policy.

use portabooru_core::domain::{AssetRef, Checksum, PostId, PostRecord, FALLBACK_EXTENSION};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::ApiError;

// ============================================================================
// Danbooru response types (JSON deserialization)
// ============================================================================

/// The fields of a Danbooru post the sync engine reads
///
/// See: <https://danbooru.donmai.us/wiki_pages/api:posts>
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DanbooruPost {
    id: Option<u64>,
    md5: Option<String>,
    file_url: Option<String>,
    file_ext: Option<String>,
    rating: Option<String>,
    tag_string: Option<String>,
    updated_at: Option<String>,
}

/// An entry of `/tags.json`
#[derive(Debug, Deserialize)]
pub struct DanbooruTag {
    pub name: String,
    #[serde(default)]
    pub post_count: u64,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a `/posts.json` body into post records, newest first as received
///
/// # Errors
/// Returns [`ApiError::InvalidResponse`] if the body is not a JSON array
pub fn parse_posts(body: &[u8]) -> Result<Vec<PostRecord>, ApiError> {
    let values: Vec<Value> = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidResponse(format!("posts listing: {e}")))?;

    let total = values.len();
    let records: Vec<PostRecord> = values.into_iter().filter_map(post_from_value).collect();
    if records.len() < total {
        debug!(
            dropped = total - records.len(),
            "Dropped listing entries without a usable id"
        );
    }
    Ok(records)
}

/// Converts one JSON object into a post record
fn post_from_value(value: Value) -> Option<PostRecord> {
    let Value::Object(metadata) = value else {
        warn!("Listing entry is not a JSON object");
        return None;
    };

    let raw = match DanbooruPost::deserialize(&Value::Object(metadata.clone())) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Listing entry has unexpected field types");
            return None;
        }
    };

    let id = raw.id?;
    let checksum = checksum_for(id, &raw)?;
    let asset = raw
        .file_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .map(|url| AssetRef {
            url: url.to_string(),
            extension: extension_for(url, raw.file_ext.as_deref()),
        });
    let rating = raw.rating.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let rating = match rating {
        Some(r) if r.chars().all(|c| c.is_ascii_alphanumeric()) => Some(r),
        Some(r) => {
            warn!(post_id = id, rating = %r, "Ignoring unusable rating");
            None
        }
        None => None,
    };

    Some(PostRecord {
        id: PostId::new(id),
        checksum,
        asset,
        rating,
        tags: split_tags(raw.tag_string.as_deref()),
        metadata: sanitize_metadata(metadata),
    })
}

/// MD5 when exposed, else the last update time, else the ID itself
fn checksum_for(id: u64, raw: &DanbooruPost) -> Option<Checksum> {
    let value = match (&raw.md5, &raw.updated_at) {
        (Some(md5), _) if !md5.trim().is_empty() => md5.clone(),
        (_, Some(updated)) if !updated.trim().is_empty() => format!("updated:{updated}"),
        _ => format!("id:{id}"),
    };
    Checksum::new(value).ok()
}

/// Asset extension: `file_ext` if present, else the URL's path extension
///
/// Anything that is not plain alphanumeric becomes `bin`, so the value is
/// always safe inside a file name.
fn extension_for(url: &str, file_ext: Option<&str>) -> String {
    if let Some(ext) = file_ext.map(str::trim).filter(|e| !e.is_empty()) {
        return normalized_extension(ext);
    }

    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|name| {
            name.rsplit_once('.')
                .map(|(_, ext)| ext.to_lowercase())
                .filter(|ext| !ext.is_empty())
        })
        .map(|ext| normalized_extension(&ext))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

fn normalized_extension(ext: &str) -> String {
    AssetRef {
        url: String::new(),
        extension: ext.to_string(),
    }
    .file_extension()
}

fn split_tags(tag_string: Option<&str>) -> Vec<String> {
    tag_string
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Drops fields that must never be written to disk
fn sanitize_metadata(mut metadata: Map<String, Value>) -> Map<String, Value> {
    metadata.remove("api_key");
    metadata
}

/// Parses a `/tags.json` body and returns the post count of `name`
///
/// Returns `None` if the board has no tag with that exact name.
pub fn parse_tag_count(body: &[u8], name: &str) -> Result<Option<u64>, ApiError> {
    let tags: Vec<DanbooruTag> = serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidResponse(format!("tag lookup: {e}")))?;

    Ok(tags
        .iter()
        .find(|t| t.name == name)
        .map(|t| t.post_count))
}
