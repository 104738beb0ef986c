//! fitscout CLI: enrich automotive part catalogs with compatible vehicle makes.
//!
//! Loads a categorized catalog, looks every part up on the configured source,
//! and keeps resumable checkpoints and an archive of finished runs.

mod commands;
mod progress;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
