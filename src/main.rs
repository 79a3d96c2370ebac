// JSON-lines bridge for agent sessions
//
// Reads commands from stdin, writes replies and session events to stdout.
// Logs go to stderr so stdout stays a clean event channel.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kodegen_agent_sessions::bridge::Bridge;
use kodegen_agent_sessions::types::options::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_LINE_BYTES, DEFAULT_STOP_TIMEOUT,
};
use kodegen_agent_sessions::{JsonFileStore, OrchestratorOptions, SessionRegistry, SubprocessLauncher};

/// Run concurrent coding-agent sessions behind a JSON-lines protocol
#[derive(Debug, Parser)]
#[command(name = "kodegen-agent-sessions", version, about)]
struct Args {
    /// Path of the agent CLI (searched on PATH when omitted)
    #[arg(long, env = "KODEGEN_AGENT_CLI")]
    cli_path: Option<PathBuf>,

    /// JSON file holding the allow-list and cost ledgers
    #[arg(long, env = "KODEGEN_AGENT_STORE")]
    store: Option<PathBuf>,

    /// Default working directory for new sessions
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Extra argument passed to every agent process (repeatable)
    #[arg(long = "agent-arg", value_name = "ARG", allow_hyphen_values = true)]
    agent_args: Vec<String>,

    /// Maximum length of one line, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_BYTES)]
    max_line_bytes: usize,

    /// Events buffered per subscriber before the oldest are dropped
    #[arg(long, default_value_t = DEFAULT_EVENT_CAPACITY)]
    event_capacity: usize,

    /// Seconds allowed for a session to stop
    #[arg(long, default_value_t = DEFAULT_STOP_TIMEOUT.as_secs())]
    stop_timeout_secs: u64,

    /// Do not request streaming partial messages from the agent
    #[arg(long)]
    no_partial_messages: bool,

    /// Start with global bypass enabled
    #[arg(long)]
    bypass: bool,
}

fn default_store_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".kodegen").join("agent-sessions").join("store.json")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let store_path = args.store.clone().unwrap_or_else(default_store_path);
    let store = JsonFileStore::open(&store_path)
        .with_context(|| format!("failed to open store {}", store_path.display()))?;
    log::info!("using store {}", store_path.display());

    let mut options = OrchestratorOptions::builder()
        .max_line_bytes(args.max_line_bytes.max(1))
        .event_capacity(args.event_capacity.max(1))
        .stop_timeout(Duration::from_secs(args.stop_timeout_secs))
        .include_partial_messages(!args.no_partial_messages);
    if let Some(cli_path) = args.cli_path {
        options = options.cli_path(cli_path);
    }
    if let Some(cwd) = args.cwd {
        options = options.cwd(cwd);
    }
    for arg in args.agent_args {
        options = options.extra_arg(arg);
    }

    let registry = Arc::new(SessionRegistry::new(
        options.build(),
        Arc::new(SubprocessLauncher),
        Arc::new(store),
    )?);
    if args.bypass {
        registry.set_global_bypass(true);
    }

    log::info!("kodegen-agent-sessions {} ready", kodegen_agent_sessions::VERSION);
    Bridge::new(registry, args.max_line_bytes.max(1))
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await?;
    Ok(())
}
