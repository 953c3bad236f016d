//! Danbooru HTTP client
//!
//! Provides an authenticated HTTP client for the board's JSON API. Every
//! request carries HTTP basic auth (`login:api_key`), passes through the
//! shared rate limiter when one is attached, and has its status classified
//! into an [`ApiError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use portabooru_api::client::BooruClient;
//! use portabooru_core::domain::Credentials;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let credentials = Credentials::new("alice", "api-key")?;
//! let client = BooruClient::with_base_url(credentials, "https://danbooru.donmai.us");
//! let profile = client.verify_credentials().await?;
//! println!("Logged in as {}", profile.name);
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use portabooru_core::config::RemoteConfig;
use portabooru_core::domain::Credentials;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info, warn};

use crate::rate_limit::{parse_retry_after, RateLimiter};
use crate::ApiError;

/// Base URL of the public Danbooru instance
pub const DANBOORU_BASE_URL: &str = "https://danbooru.donmai.us";

/// Longest error body kept in error messages
const MAX_ERROR_BODY: usize = 200;

// ============================================================================
// Response types
// ============================================================================

/// Response from the `/profile.json` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    /// Account ID
    pub id: u64,
    /// Login name
    pub name: String,
    /// Account level (`Member`, `Gold`, ...)
    #[serde(default)]
    pub level_string: Option<String>,
}

// ============================================================================
// BooruClient
// ============================================================================

/// HTTP client for Danbooru API calls
///
/// Wraps `reqwest::Client` with authentication and base URL construction.
/// Optionally integrates with a shared [`RateLimiter`].
pub struct BooruClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without trailing slash
    base_url: String,
    credentials: Credentials,
    /// Optional shared rate limiter
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl BooruClient {
    /// Creates a client from the remote configuration section
    ///
    /// # Errors
    /// Returns [`ApiError::NetworkError`] if the HTTP client cannot be built
    pub fn new(credentials: Credentials, config: &RemoteConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(30)))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            rate_limiter: None,
        })
    }

    /// Creates a client with a custom base URL and default HTTP settings
    /// (useful for testing)
    pub fn with_base_url(credentials: Credentials, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            rate_limiter: None,
        }
    }

    /// Sets the shared rate limiter for this client.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Returns a reference to the rate limiter, if configured.
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Login name used for authentication
    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    /// Creates an authenticated request builder for a path relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.request_url(method, &url)
    }

    /// Creates an authenticated request builder for an absolute URL
    pub fn request_url(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).basic_auth(
            self.credentials.username(),
            Some(self.credentials.api_key()),
        )
    }

    /// Sends a request and classifies the response status.
    ///
    /// 1. Acquires a token from the rate limiter, if any.
    /// 2. Sends the request; transport failures become [`ApiError::NetworkError`].
    /// 3. Maps non-success statuses through [`ApiError::from_status`],
    ///    parsing `Retry-After` on 429 and notifying the limiter.
    ///
    /// No retry happens here.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.acquire().await;
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.on_success();
            }
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        if status.as_u16() == 429 {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.on_throttle();
            }
            info!(
                url = %response.url(),
                retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                "Received 429 from remote"
            );
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = summarize_body(&url, &body);
        warn!(status = status.as_u16(), url = %url, "Request failed");

        Err(ApiError::from_status(status.as_u16(), message, retry_after))
    }

    /// GETs `path` with `query` and returns the raw body
    pub async fn get_body(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, ApiError> {
        let response = self.send(self.request(Method::GET, path).query(query)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// GETs `path` with `query` and decodes the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let body = self.get_body(path, query).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("GET {path}: {e}")))
    }

    /// Checks that the credentials are accepted
    ///
    /// Makes `GET /profile.json`, which answers 401 for a bad login or key.
    pub async fn verify_credentials(&self) -> Result<Profile, ApiError> {
        debug!(username = self.username(), "Verifying credentials");
        let profile: Profile = self.get_json("/profile.json", &[]).await?;
        info!(
            username = %profile.name,
            level = profile.level_string.as_deref().unwrap_or("unknown"),
            "Credentials accepted"
        );
        Ok(profile)
    }

    /// Downloads the body at an absolute URL
    ///
    /// The body is streamed into memory; a connection dropped midway is a
    /// network error like any other transport failure.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        debug!(url, "Downloading asset");
        let response = self.send(self.request_url(Method::GET, url)).await?;

        let mut data = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }

        debug!(url, bytes = data.len(), "Asset downloaded");
        Ok(data)
    }
}

/// Short description of a failed response for error messages
fn summarize_body(url: &str, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return url.to_string();
    }
    let mut end = body.len().min(MAX_ERROR_BODY);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{url}: {}", &body[..end])
}
