//! Records written to the agent's stdin

use serde_json::{Value, json};

use crate::types::identifiers::RequestId;

/// A new conversation turn
#[must_use]
pub fn user_turn(text: &str) -> Value {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": text,
        },
        "parent_tool_use_id": null,
    })
}

/// Answer a `can_use_tool` request with an allow
#[must_use]
pub fn allow_tool(request_id: &RequestId, input: &Value) -> Value {
    control_response(
        request_id,
        json!({
            "behavior": "allow",
            "updatedInput": input,
        }),
    )
}

/// Answer a `can_use_tool` request with a deny
#[must_use]
pub fn deny_tool(request_id: &RequestId, message: &str) -> Value {
    control_response(
        request_id,
        json!({
            "behavior": "deny",
            "message": message,
        }),
    )
}

fn control_response(request_id: &RequestId, response: Value) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        },
    })
}

/// Serialize a record as one newline-terminated line
///
/// # Errors
/// Returns an error if the value cannot be serialized
pub fn to_line(record: &Value) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}
