//! CLI command building for agent sessions

use std::path::PathBuf;

use crate::types::identifiers::SessionId;
use crate::types::options::OrchestratorOptions;
use crate::types::session::SessionConfig;
use crate::transport::LaunchSpec;

use super::config::{DEFAULT_CLI_NAME, is_allowed_env};

/// Builds the [`LaunchSpec`] for one session
pub struct CommandBuilder<'a> {
    options: &'a OrchestratorOptions,
    config: &'a SessionConfig,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    #[must_use]
    pub const fn new(options: &'a OrchestratorOptions, config: &'a SessionConfig) -> Self {
        Self { options, config }
    }

    /// Build the launch spec for `session_id`
    #[must_use]
    pub fn build(&self, session_id: &SessionId) -> LaunchSpec {
        let program = self
            .options
            .cli_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLI_NAME));

        // Long-lived, bidirectional stream-json session with permission
        // prompts routed over stdio.
        let mut args: Vec<String> = [
            "--print",
            "--output-format",
            "stream-json",
            "--input-format",
            "stream-json",
            "--verbose",
            "--permission-prompt-tool",
            "stdio",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        if self.options.include_partial_messages {
            args.push("--include-partial-messages".to_string());
        }

        if let Some(ref model) = self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        args.extend(self.options.extra_args.iter().cloned());

        let env = self
            .options
            .env
            .iter()
            .filter(|(key, _)| is_allowed_env(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        LaunchSpec {
            session_id: session_id.clone(),
            program,
            args,
            cwd: self.config.cwd.clone().or_else(|| self.options.cwd.clone()),
            env,
        }
    }
}
