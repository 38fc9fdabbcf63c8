mod assembly;
mod delay;
mod replication;
mod shutdown;
mod synchronizer;
mod tracing_setup;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use synchronizer::Synchronizer;

/// One-way MySQL binlog -> document-store index synchronizer.
#[derive(Parser)]
#[command(name = "mysql2es-sync")]
struct Cli {
    /// Path to the TOML configuration document (spec.md §6).
    #[arg(short = 'c', long = "conf")]
    conf: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_setup::init();

    let cli = Cli::parse();
    let config = sync_config::Config::load(&cli.conf).context("loading configuration")?;

    let synchronizer = Synchronizer::build(&config).await.context("assembling synchronizer")?;
    synchronizer.run().await
}
