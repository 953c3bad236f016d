//! Configuration module for Portabooru.
//!
//! Typed sections of `config.yaml` with loading, validation and defaults,
//! plus a builder for tests and embedding.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RetryPolicy;

/// Largest page the board serves in a single listing request.
pub const MAX_PAGE_SIZE: u32 = 200;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Portabooru.
///
/// Every section may be omitted from the file; missing sections fall back to
/// their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub archive: ArchiveConfig,
    pub rate_limiting: RateLimitingConfig,
    pub retry: RetryConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Remote board settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the board, without a trailing path.
    pub base_url: String,
    /// Posts requested per listing page (1..=200).
    pub page_size: u32,
    /// Look plain tags up in the tag catalogue before listing them.
    pub verify_tags: bool,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Local archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Root directory of the archive.
    pub root: PathBuf,
    /// SQLite index file. Defaults to `<root>/.portabooru/archive.db`.
    pub database: Option<PathBuf>,
    /// File extensions that are never downloaded, e.g. `["zip", "mp4"]`.
    pub forbidden_extensions: Vec<String>,
}

/// Request throttling, shared by every request of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Sustained request rate.
    pub requests_per_second: f64,
    /// Requests allowed back to back before throttling starts.
    pub burst: u32,
}

/// Backoff for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tags synchronized at the same time.
    pub max_concurrent_tags: usize,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit logs as JSON lines.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and parses the YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but any read or parse error yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// `$XDG_CONFIG_HOME/portabooru/config.yaml`, or the platform equivalent.
    ///
    /// Typically `$XDG_CONFIG_HOME/portabooru/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("portabooru")
            .join("config.yaml")
    }

    /// Location of the SQLite archive index.
    pub fn database_path(&self) -> PathBuf {
        self.archive
            .database
            .clone()
            .unwrap_or_else(|| self.archive.root.join(".portabooru").join("archive.db"))
    }

    /// Backoff policy for listing and asset requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: Duration::from_millis(self.retry.jitter_ms),
        }
    }
}

impl ArchiveConfig {
    /// Returns true if assets with `extension` must not be downloaded.
    ///
    /// Comparison ignores case and a leading dot on either side.
    pub fn is_forbidden(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.forbidden_extensions
            .iter()
            .any(|f| f.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://danbooru.donmai.us".to_string(),
            page_size: MAX_PAGE_SIZE,
            verify_tags: true,
            user_agent: format!("portabooru/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 60,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./outputs"),
            database: None,
            forbidden_extensions: Vec::new(),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 10,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter_ms: policy.jitter.as_millis() as u64,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tags: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// One rejected configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"remote.page_size"`.
    pub field: String,
    /// What is wrong with the value.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for `sync.max_concurrent_tags`, also enforced by the engine.
pub const MAX_CONCURRENT_TAGS: usize = 16;

impl Config {
    /// Checks every section and collects all problems.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- remote ---
        if !(self.remote.base_url.starts_with("http://")
            || self.remote.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.remote.base_url),
            });
        }
        if self.remote.page_size == 0 || self.remote.page_size > MAX_PAGE_SIZE {
            errors.push(ValidationError {
                field: "remote.page_size".into(),
                message: format!("must be in range 1..={MAX_PAGE_SIZE}"),
            });
        }
        if self.remote.user_agent.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.user_agent".into(),
                message: "must not be empty".into(),
            });
        }
        if self.remote.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- archive ---
        if self.archive.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "archive.root".into(),
                message: "must not be empty".into(),
            });
        }
        if self
            .archive
            .forbidden_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').trim().is_empty())
        {
            errors.push(ValidationError {
                field: "archive.forbidden_extensions".into(),
                message: "entries must not be empty".into(),
            });
        }

        // --- rate_limiting ---
        let rate = self.rate_limiting.requests_per_second;
        if rate.is_nan() || rate <= 0.0 {
            errors.push(ValidationError {
                field: "rate_limiting.requests_per_second".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.rate_limiting.burst == 0 {
            errors.push(ValidationError {
                field: "rate_limiting.burst".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- retry ---
        if self.retry.max_attempts == 0 {
            errors.push(ValidationError {
                field: "retry.max_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            errors.push(ValidationError {
                field: "retry.base_delay_ms".into(),
                message: format!(
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            });
        }

        // --- sync ---
        if self.sync.max_concurrent_tags == 0 || self.sync.max_concurrent_tags > MAX_CONCURRENT_TAGS
        {
            errors.push(ValidationError {
                field: "sync.max_concurrent_tags".into(),
                message: format!("must be in range 1..={MAX_CONCURRENT_TAGS}"),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent construction of a [`Config`].
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use portabooru_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .archive_root(PathBuf::from("/srv/booru"))
///     .remote_page_size(100)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Starts from the defaults.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_page_size(mut self, size: u32) -> Self {
        self.config.remote.page_size = size;
        self
    }

    pub fn remote_verify_tags(mut self, verify: bool) -> Self {
        self.config.remote.verify_tags = verify;
        self
    }

    pub fn remote_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.remote.user_agent = user_agent.into();
        self
    }

    pub fn remote_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.timeout_secs = seconds;
        self
    }

    // --- archive ---

    pub fn archive_root(mut self, root: PathBuf) -> Self {
        self.config.archive.root = root;
        self
    }

    pub fn archive_database(mut self, database: PathBuf) -> Self {
        self.config.archive.database = Some(database);
        self
    }

    pub fn archive_forbidden_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.archive.forbidden_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    // --- rate_limiting ---

    pub fn rate_limiting_requests_per_second(mut self, rate: f64) -> Self {
        self.config.rate_limiting.requests_per_second = rate;
        self
    }

    pub fn rate_limiting_burst(mut self, burst: u32) -> Self {
        self.config.rate_limiting.burst = burst;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.retry.base_delay_ms = base;
        self.config.retry.max_delay_ms = max;
        self
    }

    pub fn retry_jitter_ms(mut self, jitter: u64) -> Self {
        self.config.retry.jitter_ms = jitter;
        self
    }

    // --- sync ---

    pub fn sync_max_concurrent_tags(mut self, n: usize) -> Self {
        self.config.sync.max_concurrent_tags = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Returns the config without validating it.
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
