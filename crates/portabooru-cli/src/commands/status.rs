//! Status command - archive contents at a glance
//!
//! Without arguments, prints entry counts for the whole archive. With
//! `--tag`, lists the posts recorded under that tag.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use portabooru_core::domain::{ArchiveEntry, Tag};
use portabooru_core::ports::IArchiveIndex;

use super::AppContext;
use crate::output::{get_formatter, plural};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Show the posts recorded under this tag
    #[arg(long)]
    pub tag: Option<String>,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<ExitCode> {
        let formatter = get_formatter(ctx.format);

        let db_path = ctx.config.database_path();
        if !db_path.exists() {
            formatter.error(&format!(
                "No archive index at {}. Run 'portabooru sync' first.",
                db_path.display()
            ));
            return Ok(ExitCode::FAILURE);
        }
        let index = ctx.open_index().await?;

        match &self.tag {
            Some(name) => {
                let tag = Tag::new(name.as_str()).context("Invalid tag")?;
                let entries = index
                    .entries_for_tag(&tag)
                    .await
                    .context("Failed to query archive index")?;
                self.show_tag(&tag, &entries, ctx);
            }
            None => {
                let counts = index.count().await.context("Failed to count entries")?;
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "root": ctx.config.archive.root,
                        "total": counts.total,
                        "with_asset": counts.with_asset,
                        "without_asset": counts.without_asset(),
                    }));
                } else {
                    formatter.success(&format!(
                        "{} in {}",
                        plural(counts.total, "post"),
                        ctx.config.archive.root.display()
                    ));
                    formatter.info(&format!("With asset:    {}", counts.with_asset));
                    formatter.info(&format!("Metadata only: {}", counts.without_asset()));
                }
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn show_tag(&self, tag: &Tag, entries: &[ArchiveEntry], ctx: &AppContext) {
        let formatter = get_formatter(ctx.format);
        if ctx.format.is_json() {
            let posts: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "post_id": e.post_id,
                        "checksum": e.checksum.as_str(),
                        "directory": e.directory,
                        "asset": e.asset_path,
                        "synced_at": e.synced_at.to_rfc3339(),
                    })
                })
                .collect();
            formatter.print_json(&serde_json::json!({ "tag": tag, "posts": posts }));
            return;
        }

        let with_asset = entries.iter().filter(|e| e.asset_present()).count() as u64;
        formatter.success(&format!(
            "{}: {} ({} with asset)",
            tag,
            plural(entries.len() as u64, "post"),
            with_asset
        ));
        for entry in entries {
            let marker = if entry.asset_present() { "full" } else { "metadata" };
            formatter.info(&format!(
                "{:>10}  {:<8}  {}",
                entry.post_id,
                marker,
                entry.directory.display()
            ));
        }
    }
}
