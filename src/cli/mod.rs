//! Command-line interface.

pub(crate) mod check;
pub(crate) mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Demo service comparing a managed cache and a memoizing cache.
#[derive(Parser, Debug)]
#[command(name = "snapcache", version, about)]
pub(crate) struct Cli {
    /// Path to the JSON config file (default: ./snapcache.json)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data file path from config
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
        /// Reload the data file when it changes on disk
        #[arg(long)]
        watch: bool,
    },
    /// Parse the data file and report what it contains
    Check,
    /// Resolve a key through a fresh managed cache and print the value
    Get {
        /// Key to look up
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::parse_from(["snapcache"]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::parse_from(["snapcache", "serve", "--port", "9000", "--watch"]);
        match cli.command {
            Some(Command::Serve { port, watch }) => {
                assert_eq!(port, Some(9000));
                assert!(watch);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_get_with_global_data_flag() {
        let cli = Cli::parse_from(["snapcache", "get", "color", "--data", "/tmp/v.json"]);
        assert_eq!(cli.data, Some(PathBuf::from("/tmp/v.json")));
        assert!(matches!(cli.command, Some(Command::Get { ref key }) if key == "color"));
    }
}
