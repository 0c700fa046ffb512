use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TOOL_CALL_START: &str = "<tool_call>";
pub const TOOL_CALL_END: &str = "</tool_call>";

/// Tool identifier used when the model omits `name`.
pub const DEFAULT_TOOL_NAME: &str = "computer_use";

fn default_tool_name() -> String {
    DEFAULT_TOOL_NAME.to_string()
}

/// Canonical action handed back to the agent loop.
///
/// `arguments` is always an object. Top-level keys other than `name`/`arguments`
/// are kept in `extra` so a well-formed call survives a round trip untouched.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Action {
    #[serde(default = "default_tool_name")]
    pub name: String,
    pub arguments: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopStyle {
    /// `{"action": "stop"}`
    #[default]
    Stop,
    /// `{"action": "terminate", "status": "failure"}`
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("no <tool_call> block found")]
    MissingDelimiter,
    #[error("<tool_call> block is not terminated")]
    UnterminatedBlock,
    #[error("tool call block is not valid json")]
    DecodeFailure,
    #[error("tool call has an unusable shape: {0}")]
    ShapeMismatch(#[from] ShapeError),
    #[error("delegate parser failed")]
    DelegateFailure,
    #[error("payload is not text and no delegate parser is installed")]
    UnsupportedPayload,
}

impl ParseFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ParseFailure::MissingDelimiter => "missing_delimiter",
            ParseFailure::UnterminatedBlock => "unterminated_block",
            ParseFailure::DecodeFailure => "decode_failure",
            ParseFailure::ShapeMismatch(_) => "shape_mismatch",
            ParseFailure::DelegateFailure => "delegate_failure",
            ParseFailure::UnsupportedPayload => "unsupported_payload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("expected a json object, got {0}")]
    NotAnObject(&'static str),
    #[error("missing arguments")]
    MissingArguments,
    #[error("arguments must be an object, got {0}")]
    ArgumentsNotObject(&'static str),
    #[error("name must be a string, got {0}")]
    NameNotString(&'static str),
    #[error("arguments has no action")]
    MissingActionKey,
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Action {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            extra: Map::new(),
        }
    }

    /// The universal fallback: halt with the reasoning we managed to extract.
    pub fn stop(thoughts: &str, style: StopStyle) -> Self {
        let mut arguments = Map::new();
        match style {
            StopStyle::Stop => {
                arguments.insert("action".to_string(), Value::from("stop"));
            }
            StopStyle::Terminate => {
                arguments.insert("action".to_string(), Value::from("terminate"));
                arguments.insert("status".to_string(), Value::from("failure"));
            }
        }
        arguments.insert("thoughts".to_string(), Value::from(thoughts));
        Self::new(DEFAULT_TOOL_NAME, arguments)
    }

    /// Value of `arguments.action`, if it is a string.
    pub fn action_kind(&self) -> Option<&str> {
        self.arguments.get("action").and_then(Value::as_str)
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.action_kind(), Some("stop" | "terminate"))
    }

    /// Normalizes a decoded tool call into the canonical shape.
    ///
    /// - `name` + object `arguments`: kept as-is
    /// - object `arguments` without `name` (or `name: null`): `default_name` is injected
    /// - anything else is a shape error
    pub fn from_json(
        value: Value,
        default_name: &str,
        require_action_key: bool,
    ) -> Result<Self, ShapeError> {
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => return Err(ShapeError::NotAnObject(json_kind(&other))),
        };

        let arguments = match obj.remove("arguments") {
            Some(Value::Object(args)) => args,
            Some(other) => return Err(ShapeError::ArgumentsNotObject(json_kind(&other))),
            None => return Err(ShapeError::MissingArguments),
        };

        let name = match obj.remove("name") {
            Some(Value::String(name)) => name,
            None | Some(Value::Null) => default_name.to_string(),
            Some(other) => return Err(ShapeError::NameNotString(json_kind(&other))),
        };

        if require_action_key && !arguments.contains_key("action") {
            return Err(ShapeError::MissingActionKey);
        }

        Ok(Self {
            name,
            arguments,
            extra: obj,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut obj = self.extra.clone();
        obj.insert("name".to_string(), Value::from(self.name.as_str()));
        obj.insert(
            "arguments".to_string(),
            Value::Object(self.arguments.clone()),
        );
        Value::Object(obj)
    }

    /// Renders the action the way a well-behaved model would emit it.
    ///
    /// `</` inside strings is written as `<\/` so an argument can never close the block early.
    pub fn to_tool_call_block(&self) -> String {
        let body = self.to_json().to_string().replace("</", "<\\/");
        format!("{TOOL_CALL_START}\n{body}\n{TOOL_CALL_END}")
    }
}

/// Borrowed view of a response split around its first `<tool_call>` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolCallBlock<'a> {
    /// Text before the opening marker, trimmed.
    pub thoughts: &'a str,
    /// Text between the markers, trimmed.
    pub body: &'a str,
}

/// Reasoning that precedes the first `<tool_call>`, or the whole message when there is none.
pub fn thoughts_of(text: &str) -> &str {
    match text.find(TOOL_CALL_START) {
        Some(open) => text[..open].trim(),
        None => text.trim(),
    }
}

/// Locates the first `<tool_call>...</tool_call>` block.
///
/// Only the first opening marker counts; the closing marker is searched for right after it.
/// Anything after the closing marker is ignored.
pub fn extract_tool_call_block(text: &str) -> Result<ToolCallBlock<'_>, ParseFailure> {
    let open = text
        .find(TOOL_CALL_START)
        .ok_or(ParseFailure::MissingDelimiter)?;
    let thoughts = text[..open].trim();

    let start = open + TOOL_CALL_START.len();
    let end_rel = text[start..]
        .find(TOOL_CALL_END)
        .ok_or(ParseFailure::UnterminatedBlock)?;

    Ok(ToolCallBlock {
        thoughts,
        body: text[start..start + end_rel].trim(),
    })
}
