//! CLI entry point for Indigo.
//!
//! This binary provides the `indigo` command: one storage operation per
//! invocation, result printed as pretty JSON on stdout.

mod clause;
mod cli;
mod commands;
mod helpers;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indigo_store::{OpContext, open_storage};
use tracing::{debug, warn};

use crate::cli::Cli;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in .env; a missing file is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    helpers::init_tracing(&cli.log_level);

    let config = helpers::load_config(&cli.config)?;
    let ctx = OpContext::with_timeout(Duration::from_secs(cli.timeout));

    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                ctx.cancel();
            }
        });
    }

    let storage = ctx
        .race("open", open_storage(&config))
        .await
        .context("failed to open storage")?;
    debug!(backend = %config.kind, "storage opened");

    let output = commands::execute(storage.as_ref(), &ctx, &config, cli.command).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("failed to render output")?
    );
    Ok(())
}
