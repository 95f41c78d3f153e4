//! docfleet worker: ingests documents and answers questions for one tenant,
//! reporting liveness while it runs.

mod commands;

use anyhow::Context;
use clap::Parser;

use docfleet_infra::config::StorageConfig;
use docfleet_observability::LogFormat;

use commands::{Cli, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    docfleet_observability::init_with(cli.log_format.unwrap_or_else(LogFormat::from_env));

    let stores = Stores::open(&cli.blob_root, &StorageConfig::from_env()).await?;

    // Store adapters block on the runtime, so commands run off the async workers.
    tokio::task::spawn_blocking(move || commands::run(cli, stores))
        .await
        .context("worker command panicked")?
}
