//! shuttle - discovery-to-submission daemon and operator commands.

mod cli;
mod commands;
mod control;
mod daemon;
mod inbox;
mod runtime;
mod strategy;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "shuttle=info,shuttle_core=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = cli::Cli::parse();
    commands::run(cli).await
}
