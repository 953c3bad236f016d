//! Sync command - mirror tags into the local archive
//!
//! Provides the `portabooru sync` CLI command which:
//! 1. Collects tag requests from arguments and an optional tag file
//! 2. Verifies the credentials before any tag is touched
//! 3. Opens the archive index and runs the sync engine
//! 4. Prints one line per tag and exits non-zero if a tag failed
//!
//! Ctrl-C cancels the run; posts already written stay indexed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use portabooru_api::provider::DanbooruProvider;
use portabooru_core::domain::{parse_tag_list, SyncReport, TagOutcome, TagRequest};
use portabooru_core::ports::{IArchiveIndex, IAssetFetcher, IPostListing};
use portabooru_sync::SyncEngine;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ensure_valid, AppContext};
use crate::output::{format_duration, get_formatter, plural, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Tags to sync; prefix a tag with `*` to store metadata only
    pub tags: Vec<String>,

    /// File with one tag per line (`#` starts a comment)
    #[arg(long, value_name = "PATH")]
    pub tags_file: Option<PathBuf>,

    /// Archive directory, overriding `archive.root`
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &mut AppContext) -> Result<ExitCode> {
        let formatter = get_formatter(ctx.format);

        if let Some(root) = &self.root {
            ctx.config.archive.root = root.clone();
        }
        ensure_valid(&ctx.config)?;

        let requests = self.collect_requests()?;
        if requests.is_empty() {
            bail!("no tags given (pass tags as arguments or use --tags-file)");
        }
        info!(tags = requests.len(), root = %ctx.config.archive.root.display(), "Tags loaded");

        let client = ctx.client()?;
        match client.verify_credentials().await {
            Ok(profile) => formatter.info(&format!("Logged in as {}", profile.name)),
            Err(e) => {
                formatter.error(&format!("Credentials rejected: {e}"));
                return Ok(ExitCode::FAILURE);
            }
        }

        let index: Arc<dyn IArchiveIndex> = Arc::new(ctx.open_index().await?);
        let provider = Arc::new(DanbooruProvider::new(client, ctx.config.remote.page_size));
        let listing: Arc<dyn IPostListing> = provider.clone();
        let assets: Arc<dyn IAssetFetcher> = provider;
        let engine = SyncEngine::from_config(&ctx.config, listing, assets, index);

        let cancel = CancellationToken::new();
        spawn_interrupt_handler(cancel.clone());

        formatter.info(&format!("Syncing {}...", plural(requests.len() as u64, "tag")));
        let report = engine.sync(&requests, &cancel).await;

        if ctx.format.is_json() {
            let json = serde_json::to_value(&report).context("Failed to serialize report")?;
            formatter.print_json(&json);
        } else {
            print_report(&report, &*formatter);
        }

        if report.failed_tags().next().is_some() {
            Ok(ExitCode::FAILURE)
        } else {
            Ok(ExitCode::SUCCESS)
        }
    }

    /// Tag file lines first, then arguments; first occurrence of a tag wins
    fn collect_requests(&self) -> Result<Vec<TagRequest>> {
        let mut text = String::new();
        if let Some(path) = &self.tags_file {
            text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read tag file {}", path.display()))?;
            text.push('\n');
        }
        for tag in &self.tags {
            text.push_str(tag);
            text.push('\n');
        }
        Ok(parse_tag_list(&text)?)
    }
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current post and stopping");
            cancel.cancel();
        }
    });
}

fn describe(outcome: &TagOutcome) -> String {
    let mut parts = vec![
        format!("{} new", outcome.materialized),
        format!("{} up to date", outcome.skipped),
    ];
    if outcome.upgraded > 0 {
        parts.push(format!("{} upgraded", outcome.upgraded));
    }
    if outcome.unavailable > 0 {
        parts.push(format!("{} unavailable", outcome.unavailable));
    }
    if outcome.forbidden > 0 {
        parts.push(format!("{} forbidden", outcome.forbidden));
    }
    format!(
        "{} ({}): {} over {}",
        outcome.tag,
        outcome.policy,
        parts.join(", "),
        plural(outcome.pages as u64, "page")
    )
}

fn print_report(report: &SyncReport, formatter: &dyn OutputFormatter) {
    for outcome in &report.outcomes {
        match &outcome.error {
            None => formatter.success(&describe(outcome)),
            Some(err) => formatter.error(&format!("{}: {err}", outcome.tag)),
        }
        for failure in &outcome.failures {
            formatter.warn(&format!("post {}: {}", failure.post_id, failure.error));
        }
    }

    let failed = report.failed_tags().count();
    let summary = format!(
        "{} materialized in {}",
        plural(report.total_materialized(), "post"),
        format_duration(report.duration_ms)
    );
    if failed == 0 && report.total_post_failures() == 0 {
        formatter.success(&summary);
    } else {
        formatter.warn(&format!(
            "{summary}; {} failed, {} failed",
            plural(failed as u64, "tag"),
            plural(report.total_post_failures() as u64, "post")
        ));
    }
}

#[cfg(test)]
mod tests {
    use portabooru_core::domain::{PostId, SyncError, SyncPolicy};

    use super::*;

    fn command(tags: &[&str], tags_file: Option<PathBuf>) -> SyncCommand {
        SyncCommand {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            tags_file,
            root: None,
        }
    }

    #[test]
    fn test_collect_from_args() {
        let requests = command(&["arknights", "*furina_(genshin_impact)"], None)
            .collect_requests()
            .unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].policy, SyncPolicy::MetadataOnly);
        assert_eq!(requests[1].tag.as_str(), "furina_(genshin_impact)");
    }

    #[test]
    fn test_collect_file_then_args_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.txt");
        std::fs::write(&path, "# favourites\n*arknights\n\nsolo\n").unwrap();

        let requests = command(&["arknights", "blue_archive"], Some(path))
            .collect_requests()
            .unwrap();
        let names: Vec<&str> = requests.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(names, vec!["arknights", "solo", "blue_archive"]);
        assert_eq!(requests[0].policy, SyncPolicy::MetadataOnly);
    }

    #[test]
    fn test_collect_rejects_bare_marker() {
        assert!(command(&["*"], None).collect_requests().is_err());
    }

    #[test]
    fn test_missing_tag_file() {
        let err = command(&[], Some(PathBuf::from("/nonexistent/tags.txt")))
            .collect_requests()
            .unwrap_err();
        assert!(err.to_string().contains("tag file"));
    }

    #[test]
    fn test_describe_outcome() {
        let request = TagRequest::parse("*arknights").unwrap();
        let mut outcome = TagOutcome::new(&request);
        outcome.pages = 3;
        outcome.materialized = 4;
        outcome.skipped = 10;
        outcome.unavailable = 1;
        outcome.record_failure(
            PostId::new(9),
            SyncError::Download {
                post_id: 9,
                reason: "404".into(),
            },
        );
        assert_eq!(
            describe(&outcome),
            "arknights (metadata-only): 4 new, 10 up to date, 1 unavailable over 3 pages"
        );
    }
}
