//! Stream-json event types emitted by the CLI agent.
//!
//! The agent writes one JSON object per line when run with
//! `--output-format stream-json`. Each object carries a `type` discriminant.
//! Recognized kinds get typed variants; anything else is kept as
//! [`StreamEvent::Unknown`] with the raw payload so nothing is lost.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminant of the terminal event.
pub const RESULT_EVENT_TYPE: &str = "result";

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Known(KnownEvent),
    /// Unrecognized kind (forward-compatible), carried opaquely.
    Unknown(Value),
}

/// Event kinds with a typed payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnownEvent {
    /// Session init and other system notices.
    System(SystemEvent),
    /// Assistant turn (text, thinking, tool invocations).
    Assistant(AssistantEvent),
    /// User turn (usually tool results).
    User(UserEvent),
    /// Terminal summary for the whole run.
    Result(ResultEvent),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantEvent {
    #[serde(default)]
    pub message: AssistantMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A block inside an assistant message (`text`, `thinking`, `tool_use`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentBlock {
    pub fn is_tool_use(&self) -> bool {
        self.kind == "tool_use"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Terminal `result` event. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_api_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_denials: Option<Vec<PermissionDenial>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ExecutionError>>,
    /// Final textual content of the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultEvent {
    /// Lenient read of a raw `result` payload. Mistyped scalar fields count as
    /// absent and stay in `extra`; list entries of an unexpected shape are
    /// salvaged where possible.
    pub fn from_raw(raw: &Value) -> Self {
        let Some(map) = raw.as_object() else {
            return Self::default();
        };
        let mut rest = map.clone();
        rest.remove("type");

        Self {
            subtype: take_str(&mut rest, "subtype"),
            session_id: take_str(&mut rest, "session_id"),
            total_cost_usd: take_f64(&mut rest, "total_cost_usd"),
            num_turns: take_u64(&mut rest, "num_turns"),
            is_error: take_bool(&mut rest, "is_error"),
            duration_api_ms: take_u64(&mut rest, "duration_api_ms"),
            permission_denials: take_array(&mut rest, "permission_denials")
                .map(|items| items.iter().filter_map(PermissionDenial::from_raw).collect()),
            errors: take_array(&mut rest, "errors")
                .map(|items| items.iter().filter_map(ExecutionError::from_raw).collect()),
            result: take_str(&mut rest, "result"),
            extra: rest,
        }
    }
}

/// A tool call the agent was not allowed to make.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionDenial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<DeniedToolInput>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeniedToolInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error record reported in the terminal event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PermissionDenial {
    fn from_raw(raw: &Value) -> Option<Self> {
        let mut rest = raw.as_object()?.clone();
        let tool_input = match rest.get("tool_input") {
            Some(Value::Object(input)) => {
                let mut input = input.clone();
                rest.remove("tool_input");
                Some(DeniedToolInput {
                    command: take_str(&mut input, "command"),
                    description: take_str(&mut input, "description"),
                    extra: input,
                })
            }
            _ => None,
        };
        Some(Self {
            tool_name: take_str(&mut rest, "tool_name"),
            reason: take_str(&mut rest, "reason"),
            tool_input,
            extra: rest,
        })
    }
}

impl ExecutionError {
    /// Objects are read field by field; a bare string becomes the message.
    fn from_raw(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(message) => Some(Self {
                message: Some(message.clone()),
                ..Self::default()
            }),
            Value::Object(map) => {
                let mut rest = map.clone();
                Some(Self {
                    message: take_str(&mut rest, "message"),
                    error: take_str(&mut rest, "error"),
                    kind: take_str(&mut rest, "type"),
                    tool_name: take_str(&mut rest, "tool_name"),
                    extra: rest,
                })
            }
            _ => None,
        }
    }
}

fn take_str(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(_)) => match map.remove(key) {
            Some(Value::String(value)) => Some(value),
            _ => None,
        },
        _ => None,
    }
}

fn take_f64(map: &mut Map<String, Value>, key: &str) -> Option<f64> {
    let value = map.get(key)?.as_f64()?;
    map.remove(key);
    Some(value)
}

/// Integers, or non-negative floats rounded to the nearest integer.
fn take_u64(map: &mut Map<String, Value>, key: &str) -> Option<u64> {
    let raw = map.get(key)?;
    let value = match raw.as_u64() {
        Some(value) => value,
        None => {
            let float = raw.as_f64().filter(|f| f.is_finite() && *f >= 0.0)?;
            float.round() as u64
        }
    };
    map.remove(key);
    Some(value)
}

fn take_bool(map: &mut Map<String, Value>, key: &str) -> Option<bool> {
    let value = map.get(key)?.as_bool()?;
    map.remove(key);
    Some(value)
}

fn take_array(map: &mut Map<String, Value>, key: &str) -> Option<Vec<Value>> {
    match map.get(key) {
        Some(Value::Array(_)) => match map.remove(key) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

impl StreamEvent {
    /// Parse a single protocol line.
    pub fn parse(line: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(line)
    }

    /// The `type` discriminant, if the payload has one.
    pub fn kind(&self) -> Option<&str> {
        match self {
            StreamEvent::Known(KnownEvent::System(_)) => Some("system"),
            StreamEvent::Known(KnownEvent::Assistant(_)) => Some("assistant"),
            StreamEvent::Known(KnownEvent::User(_)) => Some("user"),
            StreamEvent::Known(KnownEvent::Result(_)) => Some(RESULT_EVENT_TYPE),
            StreamEvent::Unknown(raw) => raw.get("type").and_then(Value::as_str),
        }
    }

    pub fn as_result(&self) -> Option<&ResultEvent> {
        match self {
            StreamEvent::Known(KnownEvent::Result(result)) => Some(result),
            _ => None,
        }
    }

    /// Terminal summary for any event tagged `result`.
    ///
    /// A payload whose fields do not all match their expected types lands in
    /// [`StreamEvent::Unknown`]; it is still read here, field by field.
    pub fn result_summary(&self) -> Option<ResultEvent> {
        match self {
            StreamEvent::Known(KnownEvent::Result(result)) => Some(result.clone()),
            StreamEvent::Unknown(raw) if self.kind() == Some(RESULT_EVENT_TYPE) => {
                Some(ResultEvent::from_raw(raw))
            }
            _ => None,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantEvent> {
        match self {
            StreamEvent::Known(KnownEvent::Assistant(assistant)) => Some(assistant),
            _ => None,
        }
    }

    /// Session id carried by the event, whatever its kind.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            StreamEvent::Known(KnownEvent::System(e)) => e.session_id.as_deref(),
            StreamEvent::Known(KnownEvent::Assistant(e)) => e.session_id.as_deref(),
            StreamEvent::Known(KnownEvent::User(e)) => e.session_id.as_deref(),
            StreamEvent::Known(KnownEvent::Result(e)) => e.session_id.as_deref(),
            StreamEvent::Unknown(raw) => raw.get("session_id").and_then(Value::as_str),
        }
    }
}
