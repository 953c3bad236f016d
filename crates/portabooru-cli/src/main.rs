//! Portabooru CLI - mirror Danbooru tags into a local archive
//!
//! Provides commands for:
//! - Syncing tags (full or metadata-only) into the archive
//! - Verifying board credentials
//! - Inspecting what the archive index holds

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use portabooru_core::config::LoggingConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    load_config, status::StatusCommand, sync::SyncCommand, verify::VerifyCommand, AppContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "portabooru", version, about = "Danbooru tag sync engine")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Danbooru login name
    #[arg(long, global = true, env = "BOORU_LOGIN")]
    login: Option<String>,

    /// Danbooru API key
    #[arg(long, global = true, env = "BOORU_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronize tags into the archive
    Sync(SyncCommand),
    /// Check that the credentials are accepted
    Verify(VerifyCommand),
    /// Show what the archive index holds
    Status(StatusCommand),
}

/// Level used when `RUST_LOG` is not set
fn log_level(quiet: bool, verbose: u8, logging: &LoggingConfig) -> String {
    if quiet {
        return "warn".to_string();
    }
    match verbose {
        0 => logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, loaded_from) = load_config(cli.config.as_deref())?;
    init_tracing(
        &log_level(cli.quiet, cli.verbose, &config.logging),
        config.logging.json,
    );
    match &loaded_from {
        Some(path) => debug!(path = %path.display(), "Configuration loaded"),
        None => debug!("No configuration file, using defaults"),
    }

    let format = OutputFormat::from_flag(cli.json);
    let mut ctx = AppContext::new(config, format, cli.login, cli.api_key);

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(&mut ctx).await,
        Commands::Verify(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
    }
}
