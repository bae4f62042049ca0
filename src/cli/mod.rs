//! CLI module for querygate
//!
//! Provides command-line interface for:
//! - collections: list what the gateway exposes
//! - check: dry-run one request
//! - exec: run one request against a seeded in-memory store

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    check, check_request, collections, exec, exec_request, load_config, load_seed, run_command,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, read_request_from, write_json, write_json_to};

use crate::observability::init_logging;

/// Parse arguments, install logging and run the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(&cli.log_level);
    run_command(cli.command)
}
