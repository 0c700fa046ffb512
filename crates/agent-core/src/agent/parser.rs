//! Turns one model response into a `(thoughts, action)` pair.
//!
//! Contract:
//! - Total: every input, text or not, yields a well-formed `Action`
//! - Output that can't be trusted becomes a stop action carrying the extracted thoughts
//! - Each fallback path is reported once through the configured `ParseLog`

use std::any::type_name;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::diagnostics::{LogLevel, ParseEvent, ParseLog, TracingLog};
use super::repair::{repair_json, strip_code_fence};
use super::wire::{
    Action, DEFAULT_TOOL_NAME, ParseFailure, ShapeError, StopStyle, extract_tool_call_block,
    thoughts_of,
};
use crate::text_utils::preview;

/// Untrusted model output as handed over by the host agent.
#[derive(Debug, Clone, PartialEq)]
pub enum RawMessage {
    Text(String),
    /// Already-structured payload (e.g. pre-processed by the host). Only a delegate can
    /// interpret these.
    Structured(Value),
}

impl From<String> for RawMessage {
    fn from(text: String) -> Self {
        RawMessage::Text(text)
    }
}

impl From<&str> for RawMessage {
    fn from(text: &str) -> Self {
        RawMessage::Text(text.to_string())
    }
}

impl From<Value> for RawMessage {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => RawMessage::Text(text),
            other => RawMessage::Structured(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub thoughts: String,
    pub action: Action,
    /// Set when `action` is a substituted stop action rather than what the model asked for.
    pub fallback: Option<ParseFailure>,
}

impl ParsedResponse {
    pub fn parsed(thoughts: impl Into<String>, action: Action) -> Self {
        Self {
            thoughts: thoughts.into(),
            action,
            fallback: None,
        }
    }

    pub fn into_pair(self) -> (String, Action) {
        (self.thoughts, self.action)
    }
}

/// Anything that can turn a model payload into a parsed response.
///
/// Implementations other than `RecoveringParser` may fail; the recovering parser treats such
/// failures as a stop when it uses them as a delegate.
pub trait ActionParser: Send + Sync {
    fn parse_message(&self, message: &RawMessage) -> anyhow::Result<ParsedResponse>;
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParserConfig {
    /// Injected when a tool call has `arguments` but no `name`.
    pub default_tool_name: String,
    pub stop_style: StopStyle,
    /// Try the whole message as a bare JSON tool call when there is no `<tool_call>` block.
    pub whole_message_fallback: bool,
    /// Run the grammar-limited repair pass before giving up on invalid JSON.
    pub repair_json: bool,
    /// Treat `arguments` without an `action` key as unusable.
    pub require_action_key: bool,
    /// Raw text in log events is cut to this many code points.
    pub log_preview_chars: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_tool_name: DEFAULT_TOOL_NAME.to_string(),
            stop_style: StopStyle::Stop,
            whole_message_fallback: true,
            repair_json: false,
            require_action_key: false,
            log_preview_chars: 200,
        }
    }
}

pub struct RecoveringParser {
    config: ParserConfig,
    log: Arc<dyn ParseLog>,
    delegate: Option<Arc<dyn ActionParser>>,
}

impl fmt::Debug for RecoveringParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveringParser")
            .field("config", &self.config)
            .field("has_delegate", &self.delegate.is_some())
            .finish()
    }
}

impl Default for RecoveringParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl RecoveringParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            log: Arc::new(TracingLog),
            delegate: None,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn ParseLog>) -> Self {
        self.log = log;
        self
    }

    /// Parser consulted for payloads that aren't text.
    pub fn with_delegate(mut self, delegate: Arc<dyn ActionParser>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse(&self, message: &RawMessage) -> ParsedResponse {
        match message {
            RawMessage::Text(text) => self.parse_text(text),
            RawMessage::Structured(_) => self.parse_with_delegate(message),
        }
    }

    pub fn parse_text(&self, text: &str) -> ParsedResponse {
        let thoughts = thoughts_of(text);

        let block = match extract_tool_call_block(text) {
            Ok(block) => block,
            Err(ParseFailure::MissingDelimiter) => {
                if self.config.whole_message_fallback
                    && let Some(action) = self.decode_whole_message(thoughts)
                {
                    return ParsedResponse::parsed(thoughts, action);
                }
                return self.fallback(
                    thoughts,
                    ParseFailure::MissingDelimiter,
                    "no tool-call block found".to_string(),
                    None,
                    Some(text),
                );
            }
            Err(failure) => {
                return self.fallback(
                    thoughts,
                    failure,
                    "tool-call block has no closing </tool_call>".to_string(),
                    None,
                    Some(text),
                );
            }
        };

        let value = match self.decode(block.body) {
            Ok(value) => value,
            Err(err) => {
                return self.fallback(
                    block.thoughts,
                    ParseFailure::DecodeFailure,
                    format!("invalid tool-call json: {err}"),
                    Some(type_name::<serde_json::Error>().to_string()),
                    Some(block.body),
                );
            }
        };

        match Action::from_json(
            value,
            &self.config.default_tool_name,
            self.config.require_action_key,
        ) {
            Ok(action) => ParsedResponse::parsed(block.thoughts, action),
            Err(shape) => {
                let message = format!("unusable tool call: {shape}");
                self.fallback(
                    block.thoughts,
                    ParseFailure::ShapeMismatch(shape),
                    message,
                    None,
                    Some(block.body),
                )
            }
        }
    }

    fn parse_with_delegate(&self, message: &RawMessage) -> ParsedResponse {
        let Some(delegate) = self.delegate.as_ref() else {
            return self.fallback(
                "",
                ParseFailure::UnsupportedPayload,
                "payload is not text and no delegate parser is installed".to_string(),
                None,
                None,
            );
        };

        match catch_unwind(AssertUnwindSafe(|| delegate.parse_message(message))) {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(err)) => self.fallback(
                "",
                ParseFailure::DelegateFailure,
                format!("delegate parser failed: {err:#}"),
                Some(error_type_of(&err)),
                None,
            ),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.fallback(
                    "",
                    ParseFailure::DelegateFailure,
                    format!("delegate parser panicked: {reason}"),
                    Some("panic".to_string()),
                    None,
                )
            }
        }
    }

    fn decode(&self, body: &str) -> Result<Value, serde_json::Error> {
        match serde_json::from_str(body) {
            Ok(value) => Ok(value),
            Err(err) if self.config.repair_json => match repair_json(body) {
                Some(value) => {
                    tracing::debug!(
                        target: "computer_agent_core::parser",
                        "tool-call json recovered by repair pass"
                    );
                    Ok(value)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// A bare JSON tool call with no surrounding block. Failures here are silent; the caller
    /// reports the missing block instead.
    fn decode_whole_message(&self, trimmed: &str) -> Option<Action> {
        let candidate = if self.config.repair_json {
            strip_code_fence(trimmed)
        } else {
            trimmed
        };
        if !candidate.starts_with('{') {
            return None;
        }
        let value = self.decode(trimmed).ok()?;
        Action::from_json(
            value,
            &self.config.default_tool_name,
            self.config.require_action_key,
        )
        .ok()
    }

    fn fallback(
        &self,
        thoughts: &str,
        failure: ParseFailure,
        message: String,
        error_type: Option<String>,
        raw: Option<&str>,
    ) -> ParsedResponse {
        self.log.emit(ParseEvent {
            level: LogLevel::for_failure(&failure),
            kind: failure.kind(),
            message,
            error_type,
            preview: raw.map(|raw| preview(raw, self.config.log_preview_chars)),
        });

        let mut action = Action::stop(thoughts, self.config.stop_style);
        action.name.clone_from(&self.config.default_tool_name);
        ParsedResponse {
            thoughts: thoughts.to_string(),
            action,
            fallback: Some(failure),
        }
    }
}

/// Type name of the root cause when it is a known error type, otherwise its message.
fn error_type_of(err: &anyhow::Error) -> String {
    let root = err.root_cause();
    if root.is::<serde_json::Error>() {
        type_name::<serde_json::Error>().to_string()
    } else if root.is::<ShapeError>() {
        type_name::<ShapeError>().to_string()
    } else if root.is::<ParseFailure>() {
        type_name::<ParseFailure>().to_string()
    } else if root.is::<std::io::Error>() {
        type_name::<std::io::Error>().to_string()
    } else {
        root.to_string()
    }
}

impl ActionParser for RecoveringParser {
    fn parse_message(&self, message: &RawMessage) -> anyhow::Result<ParsedResponse> {
        Ok(self.parse(message))
    }
}
