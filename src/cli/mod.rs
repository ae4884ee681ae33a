//! CLI module for netgate
//!
//! Provides the command-line interface for:
//! - service start/stop: run a master or slave node
//! - datanode, app, query, job, token, li, ri: edit the master configuration
//! - apinode list, master show: inspect it

mod args;
mod commands;
mod config;
mod errors;

pub use args::{Cli, Command, Remote, ServiceAction, ServiceArgs, DEFAULT_MASTER};
pub use commands::{boot, load_config, run, run_command, send_command, start, stop, Node};
pub use config::Config;
pub use errors::{CliError, CliErrorCode, CliResult};
