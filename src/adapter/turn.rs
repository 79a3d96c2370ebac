//! Turn composition

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::types::permissions::EditMode;
use crate::types::session::ThinkingIntensity;

const PLAN_PREAMBLE: &str = "PLAN FIRST FOR THIS MESSAGE ONLY: describe in detail what you \
would change and wait for explicit approval in a separate message before changing anything.";

/// Build the text written to the agent for one turn
///
/// Layout: plan preamble (plan mode only), thinking directive, the user's
/// text, then the attachment paths.
#[must_use]
pub fn compose_turn(
    text: &str,
    attachments: &[PathBuf],
    mode: EditMode,
    thinking: Option<ThinkingIntensity>,
) -> String {
    let mut turn = String::with_capacity(text.len() + 64);

    if mode == EditMode::Plan {
        turn.push_str(PLAN_PREAMBLE);
        turn.push_str("\n\n");
    }
    if let Some(intensity) = thinking {
        let _ = writeln!(turn, "{} THROUGH THIS STEP BY STEP:", intensity.directive());
    }
    turn.push_str(text);

    if !attachments.is_empty() {
        turn.push_str("\n\nAttached files:");
        for path in attachments {
            let _ = write!(turn, "\n- {}", path.display());
        }
    }
    turn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_turn_is_unchanged() {
        assert_eq!(compose_turn("hello", &[], EditMode::Ask, None), "hello");
    }

    #[test]
    fn directive_preamble_and_attachments() {
        let turn = compose_turn(
            "refactor this",
            &[PathBuf::from("/src/a.rs"), PathBuf::from("/src/b.rs")],
            EditMode::Plan,
            Some(ThinkingIntensity::ThinkHard),
        );
        assert!(turn.starts_with("PLAN FIRST"));
        assert!(turn.contains("THINK HARD THROUGH THIS STEP BY STEP:\nrefactor this"));
        assert!(turn.ends_with("Attached files:\n- /src/a.rs\n- /src/b.rs"));
    }
}
