//! CLI subcommands and the wiring they share

pub mod status;
pub mod sync;
pub mod verify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use portabooru_api::client::BooruClient;
use portabooru_api::rate_limit::{RateLimitConfig, RateLimiter};
use portabooru_archive::{DatabasePool, SqliteArchiveIndex};
use portabooru_core::config::Config;
use portabooru_core::domain::Credentials;
use tracing::info;

use crate::output::OutputFormat;

/// Settings resolved from global flags, environment and config file
pub struct AppContext {
    pub config: Config,
    pub format: OutputFormat,
    login: Option<String>,
    api_key: Option<String>,
}

impl AppContext {
    pub fn new(
        config: Config,
        format: OutputFormat,
        login: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            config,
            format,
            login,
            api_key,
        }
    }

    /// Credentials from `--login`/`--api-key` or their environment variables
    pub fn credentials(&self) -> Result<Credentials> {
        let login = self
            .login
            .as_deref()
            .ok_or_else(|| anyhow!("no login given (use --login or BOORU_LOGIN)"))?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("no API key given (use --api-key or BOORU_API_KEY)"))?;
        Credentials::new(login, api_key).context("Invalid credentials")
    }

    /// Authenticated client sharing one rate limiter for every request
    pub fn client(&self) -> Result<Arc<BooruClient>> {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::from(
            &self.config.rate_limiting,
        )));
        let client = BooruClient::new(self.credentials()?, &self.config.remote)
            .context("Failed to build HTTP client")?
            .with_rate_limiter(limiter);
        Ok(Arc::new(client))
    }

    /// Opens the archive index, creating it if needed
    pub async fn open_index(&self) -> Result<SqliteArchiveIndex> {
        let db_path = self.config.database_path();
        let pool = DatabasePool::new(&db_path)
            .await
            .with_context(|| format!("Failed to open archive index {}", db_path.display()))?;
        Ok(SqliteArchiveIndex::new(&pool))
    }
}

/// Loads the configuration file
///
/// An explicit `--config` path must exist. Without one, the default path is
/// used when present and built-in defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    match explicit {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok((config, Some(path.to_path_buf())))
        }
        None => {
            let path = Config::default_path();
            if path.exists() {
                let config = Config::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?;
                Ok((config, Some(path)))
            } else {
                Ok((Config::default(), None))
            }
        }
    }
}

/// Fails with every validation message joined
pub fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    info!(errors = errors.len(), "Configuration rejected");
    Err(anyhow!("invalid configuration: {}", messages.join("; ")))
}
