//! snapcache binary.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use snapcache::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(data) = args.data {
        config.repository.path = data;
    }
    snapcache::logging::init_logging(&config.logging)?;

    match args.command.unwrap_or(Command::Serve {
        port: None,
        watch: false,
    }) {
        Command::Serve { port, watch } => cli::serve::cmd_serve(config, port, watch).await,
        Command::Check => cli::check::cmd_check(&config).await,
        Command::Get { key } => cli::check::cmd_get(&config, &key).await,
    }
}
