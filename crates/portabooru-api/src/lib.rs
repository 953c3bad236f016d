//! Portabooru API - Danbooru HTTP client
//!
//! Provides an async client for:
//! - Credential verification
//! - Paginated tag listings (`/posts.json`)
//! - Tag catalogue lookups (`/tags.json`)
//! - Binary asset downloads
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client with status classification
//! - [`posts`] - Danbooru JSON parsing into domain post records
//! - [`provider`] - Port implementations used by the sync engine
//! - [`rate_limit`] - Shared token bucket throttling every request

pub mod client;
pub mod posts;
pub mod provider;
pub mod rate_limit;

use std::time::Duration;

use portabooru_core::ports::RemoteError;
use thiserror::Error;

/// Errors that can occur when communicating with the board
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials are missing or invalid (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials lack access to the resource (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded; retry after the given duration if the server sent one
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Option<Duration>,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Any other 4xx status (invalid query, gone, locked)
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::TooManyRequests { retry_after },
            500..=599 => ApiError::ServerError { status, message },
            _ => ApiError::Rejected { status, message },
        }
    }
}

impl From<ApiError> for RemoteError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(msg) | ApiError::Forbidden(msg) => {
                RemoteError::Unauthorized(msg)
            }
            ApiError::NotFound(message) => RemoteError::Rejected {
                status: 404,
                message,
            },
            ApiError::TooManyRequests { retry_after } => RemoteError::RateLimited { retry_after },
            ApiError::ServerError { status, message } => RemoteError::Server { status, message },
            ApiError::Rejected { status, message } => RemoteError::Rejected { status, message },
            ApiError::NetworkError(e) => RemoteError::Network(e.to_string()),
            ApiError::InvalidResponse(msg) => RemoteError::InvalidResponse(msg),
        }
    }
}
