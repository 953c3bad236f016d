//! Verify command - check credentials against the board

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use super::AppContext;
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct VerifyCommand {}

impl VerifyCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<ExitCode> {
        let formatter = get_formatter(ctx.format);
        let client = ctx.client()?;

        match client.verify_credentials().await {
            Ok(profile) => {
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": true,
                        "id": profile.id,
                        "name": profile.name,
                        "level": profile.level_string,
                        "base_url": client.base_url(),
                    }));
                } else {
                    formatter.success(&format!("Logged in as {}", profile.name));
                    if let Some(level) = &profile.level_string {
                        formatter.info(&format!("Level: {level}"));
                    }
                    formatter.info(&format!("Board: {}", client.base_url()));
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "error": e.to_string(),
                    }));
                } else {
                    formatter.error(&format!("Credentials rejected: {e}"));
                }
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
