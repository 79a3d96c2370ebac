//! Event Parser for the agent CLI's stream-json output
//!
//! One stdout record goes in, zero or more [`StreamEvent`]s come out. The
//! parser holds no state and performs no I/O; correlation that needs memory
//! (tool names on results, cumulative cost to delta) is done by the adapter.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::types::cost::Cost;
use crate::types::events::{ErrorKind, StreamEvent, TokenCounts};
use crate::types::identifiers::{RequestId, ToolName};

/// Longest excerpt of the offending line kept in a [`ParseFailure`]
const EXCERPT_CHARS: usize = 200;

/// A record that could not be turned into events
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {excerpt}")]
pub struct ParseFailure {
    /// What was wrong with the record
    pub reason: String,
    /// Leading part of the raw line
    pub excerpt: String,
}

impl ParseFailure {
    fn new(reason: impl Into<String>, line: &str) -> Self {
        let excerpt = match line.char_indices().nth(EXCERPT_CHARS) {
            Some((idx, _)) => format!("{}…", &line[..idx]),
            None => line.to_string(),
        };
        Self {
            reason: reason.into(),
            excerpt,
        }
    }
}

/// Parse one raw stdout line
///
/// Blank lines yield no events. Unknown record kinds become a
/// [`StreamEvent::SystemNotice`] rather than a failure.
///
/// # Errors
/// Returns [`ParseFailure`] for invalid JSON, non-object records, records
/// without a `type`, and known record kinds with a malformed body.
pub fn parse_line(line: &str) -> Result<Vec<StreamEvent>, ParseFailure> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let record: Value = serde_json::from_str(line)
        .map_err(|e| ParseFailure::new(format!("invalid JSON ({e})"), line))?;
    classify(record).map_err(|reason| ParseFailure::new(reason, line))
}

fn classify(record: Value) -> Result<Vec<StreamEvent>, String> {
    let kind = match &record {
        Value::Object(map) => map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| "record has no string `type` field".to_string())?
            .to_string(),
        _ => return Err("record is not a JSON object".to_string()),
    };

    match kind.as_str() {
        "system" => Ok(vec![body::<SystemRecord>(record, &kind)?.into_notice()]),
        "stream_event" => Ok(body::<StreamEventRecord>(record, &kind)?.into_events()),
        "assistant" => Ok(body::<MessageRecord>(record, &kind)?.assistant_events()),
        "user" => Ok(body::<MessageRecord>(record, &kind)?.user_events()),
        "result" => Ok(body::<ResultRecord>(record, &kind)?.into_events()),
        "control_request" => body::<ControlRequestRecord>(record, &kind)?.into_events(),
        "control_response" | "keep_alive" => Ok(Vec::new()),
        "error" => Ok(vec![body::<ErrorRecord>(record, &kind)?.into_event()]),
        other => Ok(vec![StreamEvent::notice(format!(
            "Unrecognised agent record `{other}`"
        ))]),
    }
}

fn body<T: DeserializeOwned>(record: Value, kind: &str) -> Result<T, String> {
    serde_json::from_value(record).map_err(|e| format!("malformed `{kind}` record ({e})"))
}

// ============================================================================
// Record bodies
// ============================================================================

#[derive(Deserialize)]
struct SystemRecord {
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl SystemRecord {
    fn into_notice(self) -> StreamEvent {
        match (self.subtype.as_deref(), self.message) {
            (Some("init"), _) => StreamEvent::notice(format!(
                "Agent ready (model: {}, cwd: {})",
                self.model.as_deref().unwrap_or("default"),
                self.cwd.as_deref().unwrap_or("unknown"),
            )),
            (_, Some(message)) => StreamEvent::notice(message),
            (Some(subtype), None) => StreamEvent::notice(format!("System: {subtype}")),
            (None, None) => StreamEvent::notice("System"),
        }
    }
}

#[derive(Deserialize)]
struct StreamEventRecord {
    event: ApiStreamEvent,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiStreamEvent {
    ContentBlockDelta { delta: ContentDelta },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Other,
}

impl StreamEventRecord {
    fn into_events(self) -> Vec<StreamEvent> {
        match self.event {
            ApiStreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text },
            } => vec![StreamEvent::AssistantMessage {
                text,
                partial: true,
            }],
            ApiStreamEvent::ContentBlockDelta {
                delta: ContentDelta::ThinkingDelta { thinking },
            } => vec![StreamEvent::ThinkingMessage {
                text: thinking,
                partial: true,
            }],
            _ => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct MessageRecord {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: MessageContent,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: ToolName,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

impl ContentBlock {
    fn into_tool_result(tool_use_id: String, content: &Value, is_error: bool) -> StreamEvent {
        StreamEvent::ToolResult {
            tool_use_id,
            tool_name: None,
            output: render_tool_output(content),
            is_error,
        }
    }
}

impl MessageRecord {
    fn blocks(self) -> Vec<ContentBlock> {
        match self.message.content {
            MessageContent::Text(text) => vec![ContentBlock::Text { text }],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    fn assistant_events(self) -> Vec<StreamEvent> {
        self.blocks()
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(StreamEvent::AssistantMessage {
                    text,
                    partial: false,
                }),
                ContentBlock::Thinking { thinking } => Some(StreamEvent::ThinkingMessage {
                    text: thinking,
                    partial: false,
                }),
                ContentBlock::ToolUse { id, name, input } => Some(StreamEvent::ToolCall {
                    tool_use_id: id,
                    tool_name: name,
                    input,
                }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(ContentBlock::into_tool_result(tool_use_id, &content, is_error)),
                ContentBlock::Other => None,
            })
            .collect()
    }

    fn user_events(self) -> Vec<StreamEvent> {
        self.blocks()
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(StreamEvent::UserMessage { text }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(ContentBlock::into_tool_result(tool_use_id, &content, is_error)),
                _ => None,
            })
            .collect()
    }
}

/// Flatten a tool result's content into display text
fn render_tool_output(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part.get("type").and_then(Value::as_str) {
                Some("text") => part
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                Some(other) => format!("[{other}]"),
                None => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Fields are kept as raw values so a bad sub-field never costs the
/// record its `TurnComplete`
#[derive(Deserialize)]
struct ResultRecord {
    #[serde(default)]
    subtype: Value,
    #[serde(default)]
    is_error: Value,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    total_cost_usd: Value,
    #[serde(default)]
    cost_usd: Value,
    #[serde(default)]
    usage: Value,
}

impl ResultRecord {
    fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(4);
        let mut problems = Vec::new();

        let total_cost = lenient_cost(&self.total_cost_usd, "total_cost_usd", &mut problems);
        let cost_delta = lenient_cost(&self.cost_usd, "cost_usd", &mut problems);
        let tokens = match self.usage {
            Value::Null => None,
            usage => match serde_json::from_value::<TokenCounts>(usage) {
                Ok(tokens) => Some(tokens),
                Err(e) => {
                    problems.push(format!("`usage` ({e})"));
                    None
                }
            },
        };
        let is_error = match self.is_error {
            Value::Null => false,
            Value::Bool(flag) => flag,
            other => {
                problems.push(format!("`is_error` is not a boolean: {other}"));
                false
            }
        };

        if !problems.is_empty() {
            events.push(StreamEvent::protocol_error(format!(
                "ignored malformed `result` field(s): {}",
                problems.join("; ")
            )));
        }

        if total_cost.is_some() || cost_delta.is_some() || tokens.is_some() {
            events.push(StreamEvent::UsageUpdate {
                cost_delta: cost_delta.unwrap_or(Cost::ZERO),
                total_cost,
                tokens: tokens.unwrap_or_default(),
            });
        }

        if is_error {
            let detail = self
                .result
                .as_str()
                .filter(|r| !r.is_empty())
                .or_else(|| self.subtype.as_str())
                .map_or_else(|| "agent reported a failed turn".to_string(), str::to_string);
            events.push(StreamEvent::Error {
                kind: ErrorKind::Agent,
                detail,
            });
        }

        events.push(StreamEvent::TurnComplete { stopped: false });
        events
    }
}

/// Read an amount given as a JSON number or decimal string
fn lenient_cost(value: &Value, field: &str, problems: &mut Vec<String>) -> Option<Cost> {
    let parsed = match value {
        Value::Null => return None,
        Value::Number(number) => Cost::from_json_number(number),
        Value::String(text) => Cost::parse_decimal(text),
        _ => None,
    };
    if parsed.is_none() {
        problems.push(format!("`{field}` is not a usable amount: {value}"));
    }
    parsed
}

#[derive(Deserialize)]
struct ControlRequestRecord {
    request_id: RequestId,
    request: Value,
}

#[derive(Deserialize)]
struct CanUseTool {
    tool_name: ToolName,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    tool_use_id: Option<String>,
}

impl ControlRequestRecord {
    fn into_events(self) -> Result<Vec<StreamEvent>, String> {
        let subtype = self
            .request
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if subtype != "can_use_tool" {
            return Ok(vec![StreamEvent::notice(format!(
                "Agent control request `{subtype}` ignored"
            ))]);
        }

        let ask: CanUseTool = body(self.request, "can_use_tool")?;
        Ok(vec![StreamEvent::PermissionRequest {
            request_id: self.request_id,
            tool_name: ask.tool_name,
            preview: ask.input,
            tool_use_id: ask.tool_use_id,
        }])
    }
}

#[derive(Deserialize)]
struct ErrorRecord {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Value,
}

impl ErrorRecord {
    fn into_event(self) -> StreamEvent {
        let detail = self
            .message
            .or_else(|| self.error.as_str().map(str::to_string))
            .or_else(|| {
                self.error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "agent reported an error".to_string());
        StreamEvent::Error {
            kind: ErrorKind::Agent,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_is_bounded() {
        let long = "x".repeat(1000);
        let failure = ParseFailure::new("bad", &long);
        assert!(failure.excerpt.chars().count() <= EXCERPT_CHARS + 1);
    }

    #[test]
    fn tool_output_flattens_text_parts() {
        let content = serde_json::json!([
            {"type": "text", "text": "line one"},
            {"type": "image", "source": {}},
            {"type": "text", "text": "line two"}
        ]);
        assert_eq!(render_tool_output(&content), "line one\n[image]\nline two");
    }
}
