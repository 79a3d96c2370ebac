//! Configuration constants for the subprocess launcher

/// Program name searched for when no CLI path is configured
pub const DEFAULT_CLI_NAME: &str = "claude";

/// Environment variables that are never passed through to the agent process
///
/// These variables can affect how the subprocess loads and executes code.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

/// Whether an override for `key` may be passed to the agent process
#[must_use]
pub fn is_allowed_env(key: &str) -> bool {
    !DANGEROUS_ENV_VARS.contains(&key)
}
