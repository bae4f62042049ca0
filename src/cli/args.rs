//! CLI argument definitions using clap
//!
//! Commands:
//! - querygate collections [--config <path>]
//! - querygate check [--config <path>]
//! - querygate exec [--config <path>] [--seed <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// querygate - gated query execution against a document store
#[derive(Parser, Debug)]
#[command(name = "querygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the addressable collections and permitted operations
    Collections {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate one request from stdin and print the prepared plan
    Check {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Execute one request from stdin against an in-memory store
    Exec {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON seed file: { "<collection>": [ {doc}, ... ] }
        #[arg(long)]
        seed: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exec_with_seed() {
        let cli = Cli::try_parse_from([
            "querygate",
            "exec",
            "--config",
            "gw.json",
            "--seed",
            "seed.json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "warn");
        match cli.command {
            Command::Exec { config, seed } => {
                assert_eq!(config, Some(PathBuf::from("gw.json")));
                assert_eq!(seed, Some(PathBuf::from("seed.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_config_is_optional() {
        let cli = Cli::try_parse_from(["querygate", "collections"]).unwrap();
        assert!(matches!(cli.command, Command::Collections { config: None }));
    }

    #[test]
    fn test_unknown_command_fails() {
        assert!(Cli::try_parse_from(["querygate", "serve"]).is_err());
    }
}
