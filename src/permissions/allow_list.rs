//! Persistent allow-list of (tool, pattern) rules
//!
//! Rules are loaded from the store once and appended to it on every new
//! rule. Patterns are globs matched against the `command` field of
//! command-bearing tools; a rule without a pattern covers every invocation of
//! its tool.

use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::store::{ALLOW_LIST_KEY, KeyValueStore};
use crate::types::identifiers::ToolName;
use crate::types::permissions::AllowRule;

/// Programs whose first argument selects a subcommand (`npm install`, `git push`)
const SUBCOMMAND_PROGRAMS: &[&str] = &[
    "npm", "npx", "pnpm", "yarn", "bun", "git", "cargo", "docker", "kubectl", "go", "pip",
    "uv", "poetry", "gh",
];

/// Shell operators that chain or redirect commands
const SHELL_OPERATORS: &[&str] = &["&&", "||", ";", "|", "`", "$(", ">", "<", "\n"];

/// Command text of a tool input, if the tool carries one
#[must_use]
pub fn command_of(input: &Value) -> Option<&str> {
    input.get("command").and_then(Value::as_str)
}

/// Whether a command chains or redirects into further commands
#[must_use]
pub fn contains_shell_operator(command: &str) -> bool {
    SHELL_OPERATORS.iter().any(|op| command.contains(op))
}

/// Rule recorded for an `allowed-always` decision
///
/// Subcommand-style programs get `<program> <subcommand> *`; other commands
/// are recorded verbatim; tools without a command get a tool-wide rule.
#[must_use]
pub fn derive_rule(tool_name: &ToolName, input: &Value) -> AllowRule {
    let Some(command) = command_of(input).map(str::trim).filter(|c| !c.is_empty()) else {
        return AllowRule::tool(tool_name.clone());
    };

    let mut words = command.split_whitespace();
    match (words.next(), words.next()) {
        (Some(program), Some(sub))
            if SUBCOMMAND_PROGRAMS.contains(&program) && !contains_shell_operator(sub) =>
        {
            AllowRule::with_pattern(tool_name.clone(), format!("{program} {sub} *"))
        }
        _ => AllowRule::with_pattern(tool_name.clone(), command),
    }
}

struct CompiledRule {
    rule: AllowRule,
    matcher: Option<GlobMatcher>,
}

impl CompiledRule {
    fn new(rule: AllowRule) -> Self {
        let matcher = rule.pattern.as_deref().and_then(|pattern| match Glob::new(pattern) {
            Ok(glob) => Some(glob.compile_matcher()),
            Err(e) => {
                log::warn!("allow rule {rule} is not a valid glob ({e}); matching literally");
                None
            }
        });
        Self { rule, matcher }
    }

    fn matches(&self, tool_name: &ToolName, input: &Value) -> bool {
        if self.rule.tool_name != *tool_name {
            return false;
        }
        let Some(ref pattern) = self.rule.pattern else {
            return true;
        };
        let Some(command) = command_of(input).map(str::trim) else {
            return false;
        };
        if command == pattern {
            return true;
        }
        // A glob never stretches over chained commands.
        !contains_shell_operator(command)
            && self.matcher.as_ref().is_some_and(|m| m.is_match(command))
    }
}

/// Global allow-list shared by every session
pub struct AllowList {
    store: Arc<dyn KeyValueStore>,
    rules: RwLock<Vec<CompiledRule>>,
}

impl AllowList {
    /// Load the rules persisted in `store`
    ///
    /// Entries that do not decode as rules are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut rules: Vec<CompiledRule> = Vec::new();
        if let Some(Value::Array(entries)) = store.get(ALLOW_LIST_KEY)? {
            for entry in entries {
                match serde_json::from_value::<AllowRule>(entry) {
                    Ok(rule) if !rules.iter().any(|r| r.rule == rule) => {
                        rules.push(CompiledRule::new(rule));
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("skipping malformed allow rule: {e}"),
                }
            }
        }
        log::debug!("loaded {} allow rules", rules.len());

        Ok(Self {
            store,
            rules: RwLock::new(rules),
        })
    }

    /// Snapshot of the current rules in insertion order
    #[must_use]
    pub fn rules(&self) -> Vec<AllowRule> {
        self.rules.read().iter().map(|r| r.rule.clone()).collect()
    }

    /// Append a rule unless an identical one exists
    ///
    /// Returns `true` when the rule was new.
    ///
    /// # Errors
    /// Returns an error if the store append fails; the rule is not added then
    pub fn add(&self, rule: AllowRule) -> Result<bool> {
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.rule == rule) {
            return Ok(false);
        }
        self.store
            .append(ALLOW_LIST_KEY, serde_json::to_value(&rule)?)?;
        log::info!("allow rule added: {rule}");
        rules.push(CompiledRule::new(rule));
        Ok(true)
    }

    /// First rule covering this invocation
    #[must_use]
    pub fn find_match(&self, tool_name: &ToolName, input: &Value) -> Option<AllowRule> {
        self.rules
            .read()
            .iter()
            .find(|r| r.matches(tool_name, input))
            .map(|r| r.rule.clone())
    }
}
