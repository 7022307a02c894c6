//! `kai`: replays transport event fixtures through the command agent.

mod bootstrap_helpers;
mod cli_args;
mod fixture_replay;

use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::fixture_replay::{load_fixture, replay_fixture, write_records};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    run_cli(cli).await
}

async fn run_cli(cli: Cli) -> Result<()> {
    let fixture = load_fixture(&cli.fixture)?;
    let (records, summary) = replay_fixture(fixture, cli.agent_config()).await?;
    match &cli.outbound_log {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_records(&mut BufWriter::new(file), &records)?;
        }
        None => write_records(&mut std::io::stdout().lock(), &records)?,
    }
    tracing::info!(
        summary = %serde_json::to_string(&summary).unwrap_or_default(),
        "replay summary"
    );
    Ok(())
}
