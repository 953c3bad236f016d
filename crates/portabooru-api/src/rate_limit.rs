//! Request throttling for the remote board
//!
//! Every request of a run, listing or asset download, from any tag, draws
//! from the same [`RateLimiter`]. The board enforces its budget per account,
//! so a per-tag limiter would overshoot as soon as two tags run at once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use portabooru_api::rate_limit::{RateLimitConfig, RateLimiter};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(RateLimitConfig::default());
//! limiter.acquire().await;
//! // ... make API call ...
//! limiter.on_success();
//! # }
//! ```

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use portabooru_core::config::RateLimitingConfig;
use tracing::{debug, warn};

/// Consecutive successes needed before throttled capacity grows back
const RECOVERY_INTERVAL: u64 = 50;

// ============================================================================
// RateLimitConfig
// ============================================================================

/// Token bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Requests allowed back to back
    pub burst: u32,
    /// Tokens added per second
    pub requests_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&RateLimitingConfig::default())
    }
}

impl From<&RateLimitingConfig> for RateLimitConfig {
    fn from(config: &RateLimitingConfig) -> Self {
        Self {
            burst: config.burst.max(1),
            requests_per_second: config.requests_per_second,
        }
    }
}

// ============================================================================
// RateLimiter
// ============================================================================

#[derive(Debug)]
struct BucketState {
    /// Available tokens, fractional for smooth refill
    tokens: f64,
    last_refill: Instant,
    /// Capacity after throttle reductions, never above `burst`
    effective_capacity: u32,
    consecutive_successes: u64,
}

impl BucketState {
    fn refill(&mut self, rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * rate).min(self.effective_capacity as f64);
            self.last_refill = now;
        }
    }
}

/// Shared adaptive token bucket
///
/// Capacity halves on every HTTP 429 and grows back by one token after each
/// run of consecutive successes, up to the configured burst.
///
/// Thread-safe and designed to be shared via `Arc<RateLimiter>`.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Creates a limiter whose bucket starts full
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.burst as f64,
                last_refill: Instant::now(),
                effective_capacity: config.burst,
                consecutive_successes: 0,
            }),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Takes a token if one is available, without waiting
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.refill(self.config.requests_per_second);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token is available; zero if one is available now
    pub fn time_until_available(&self) -> Duration {
        let mut state = self.state.lock().unwrap();
        state.refill(self.config.requests_per_second);
        if state.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.config.requests_per_second <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64((1.0 - state.tokens) / self.config.requests_per_second)
    }

    /// Waits until a token is available and takes it
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let wait = self
                .time_until_available()
                .clamp(Duration::from_millis(10), Duration::from_secs(60));
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting for refill");
            tokio::time::sleep(wait).await;
        }
    }

    /// Records a successful request for adaptive recovery
    pub fn on_success(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_successes += 1;
        if state.consecutive_successes % RECOVERY_INTERVAL == 0
            && state.effective_capacity < self.config.burst
        {
            state.effective_capacity += 1;
            debug!(
                capacity = state.effective_capacity,
                "Rate limit capacity recovering"
            );
        }
    }

    /// Records an HTTP 429 and halves the effective capacity
    pub fn on_throttle(&self) {
        let mut state = self.state.lock().unwrap();
        let old = state.effective_capacity;
        state.effective_capacity = (old / 2).max(1);
        state.tokens = state.tokens.min(state.effective_capacity as f64);
        state.consecutive_successes = 0;
        warn!(
            old_capacity = old,
            new_capacity = state.effective_capacity,
            "Throttled by remote, reducing request capacity"
        );
    }

    /// Current effective capacity
    pub fn effective_capacity(&self) -> u32 {
        self.state.lock().unwrap().effective_capacity
    }
}

// ============================================================================
// Retry-After header parsing
// ============================================================================

/// Longest server-requested wait that is honoured
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Parses a `Retry-After` header value.
///
/// The header can be either an integer number of seconds (`"30"`) or an
/// HTTP-date (`"Fri, 31 Dec 2025 23:59:59 GMT"`). Returns `None` if the value
/// cannot be parsed, so the caller falls back to its own backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        let wait = diff.to_std().unwrap_or(Duration::ZERO);
        return Some(wait.min(MAX_RETRY_AFTER));
    }

    warn!(value, "Could not parse Retry-After header");
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn limiter(burst: u32, rate: f64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            burst,
            requests_per_second: rate,
        })
    }

    #[test]
    fn test_starts_full() {
        let limiter = limiter(3, 0.0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_refill_over_time() {
        let limiter = limiter(2, 200.0);
        while limiter.try_acquire() {}
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_time_until_available() {
        let limiter = limiter(1, 2.0);
        assert_eq!(limiter.time_until_available(), Duration::ZERO);
        assert!(limiter.try_acquire());
        let wait = limiter.time_until_available();
        assert!(wait > Duration::ZERO && wait <= Duration::from_millis(500));
    }

    #[test]
    fn test_throttle_halves_capacity_with_floor() {
        let limiter = limiter(8, 1.0);
        limiter.on_throttle();
        assert_eq!(limiter.effective_capacity(), 4);
        limiter.on_throttle();
        limiter.on_throttle();
        limiter.on_throttle();
        assert_eq!(limiter.effective_capacity(), 1);
    }

    #[test]
    fn test_success_recovers_capacity_up_to_burst() {
        let limiter = limiter(4, 1.0);
        limiter.on_throttle();
        assert_eq!(limiter.effective_capacity(), 2);

        for _ in 0..RECOVERY_INTERVAL {
            limiter.on_success();
        }
        assert_eq!(limiter.effective_capacity(), 3);

        for _ in 0..(RECOVERY_INTERVAL * 10) {
            limiter.on_success();
        }
        assert_eq!(limiter.effective_capacity(), 4);
    }

    #[test]
    fn test_throttle_resets_success_run() {
        let limiter = limiter(4, 1.0);
        limiter.on_throttle();
        for _ in 0..(RECOVERY_INTERVAL - 1) {
            limiter.on_success();
        }
        limiter.on_throttle();
        limiter.on_success();
        assert_eq!(limiter.effective_capacity(), 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = limiter(1, 50.0);
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_shared_between_tasks() {
        let limiter = Arc::new(limiter(4, 0.0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.try_acquire() }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 4);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = RateLimitingConfig {
            requests_per_second: 2.0,
            burst: 0,
        };
        let config = RateLimitConfig::from(&settings);
        assert_eq!(config.burst, 1);
        assert_eq!(config.requests_per_second, 2.0);
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_is_capped() {
        assert_eq!(parse_retry_after("999999"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_http_date_in_past() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_invalid() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }
}
