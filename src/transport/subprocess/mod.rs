//! Subprocess launcher for the agent CLI
//!
//! Spawns the CLI with `tokio::process`, pipes all three standard streams and
//! hands stdin/stdout to the adapter. Stderr is drained into the log.

mod command;
mod config;
mod launcher;
mod lifecycle;

pub use command::CommandBuilder;
pub use config::{DANGEROUS_ENV_VARS, DEFAULT_CLI_NAME};
pub use launcher::{SubprocessLauncher, find_cli};
