mod config;
mod host;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::config::Config;
use crate::host::Host;

/// Watch IPv4 endpoints with ICMP echo and log when they go up or down
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/pingwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start with debug logging regardless of the config file
    #[arg(short, long)]
    debug: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_ref())?;
    let mut config = Config::from_path(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.logging.debug |= cli.debug;

    if cli.print_config {
        print!("{config}");
        return Ok(());
    }

    let log = logger::init_with_debug(config.logging.debug);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting pingwatch");

    Host::new(config, config_path, log)?.run().await
}
