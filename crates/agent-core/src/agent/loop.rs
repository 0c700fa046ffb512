use std::fmt;
use std::sync::Arc;

use super::diagnostics::ParseLog;
use super::parser::{ActionParser, ParsedResponse, ParserConfig, RawMessage, RecoveringParser};
use super::wire::{Action, ParseFailure, thoughts_of};

/// Host-side agent state that owns the "current parser".
///
/// Swapping parsers happens here at construction time; an installed parser can keep the
/// previous one as its delegate instead of patching it.
pub struct AgentLoop {
    parser: Arc<dyn ActionParser>,
    /// Shapes the stop action used when the current parser itself errors.
    stop_config: ParserConfig,
    pub last_error: Option<String>,
    pub last_fallback: Option<ParseFailure>,
    pub steps: u64,
}

impl fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentLoop")
            .field("stop_config", &self.stop_config)
            .field("last_error", &self.last_error)
            .field("last_fallback", &self.last_fallback)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl Default for AgentLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentLoop {
    pub fn new() -> Self {
        Self::with_parser(Arc::new(RecoveringParser::default()))
    }

    pub fn with_parser(parser: Arc<dyn ActionParser>) -> Self {
        Self {
            parser,
            stop_config: ParserConfig::default(),
            last_error: None,
            last_fallback: None,
            steps: 0,
        }
    }

    /// Stop style and tool name for the stop built when the current parser errors.
    pub fn with_stop_config(mut self, config: ParserConfig) -> Self {
        self.stop_config = config;
        self
    }

    pub fn parser(&self) -> &Arc<dyn ActionParser> {
        &self.parser
    }

    /// Replaces the current parser with a `RecoveringParser` that delegates to it.
    pub fn install_recovering_parser(&mut self, config: ParserConfig) {
        let parser = RecoveringParser::new(config.clone()).with_delegate(self.parser.clone());
        self.parser = Arc::new(parser);
        self.stop_config = config;
    }

    pub fn install_recovering_parser_with_log(
        &mut self,
        config: ParserConfig,
        log: Arc<dyn ParseLog>,
    ) {
        let parser = RecoveringParser::new(config.clone())
            .with_log(log)
            .with_delegate(self.parser.clone());
        self.parser = Arc::new(parser);
        self.stop_config = config;
    }

    /// Parses one model response and records why it fell back, if it did.
    ///
    /// An error from a non-recovering parser is turned into a stop here so it never reaches
    /// the caller's control loop.
    pub fn parse_llm_response(&mut self, message: &RawMessage) -> ParsedResponse {
        self.steps = self.steps.saturating_add(1);

        let parsed = match self.parser.parse_message(message) {
            Ok(parsed) => parsed,
            Err(err) => {
                let reason = format!("{err:#}");
                tracing::error!(error = %reason, "parser returned an error");
                self.last_error = Some(reason);
                let thoughts = match message {
                    RawMessage::Text(text) => thoughts_of(text).to_string(),
                    RawMessage::Structured(_) => String::new(),
                };
                let mut action = Action::stop(&thoughts, self.stop_config.stop_style);
                action.name.clone_from(&self.stop_config.default_tool_name);
                self.last_fallback = Some(ParseFailure::DelegateFailure);
                return ParsedResponse {
                    thoughts,
                    action,
                    fallback: Some(ParseFailure::DelegateFailure),
                };
            }
        };

        self.last_fallback = parsed.fallback.clone();
        if let Some(failure) = &parsed.fallback {
            self.last_error = Some(failure.to_string());
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::agent::diagnostics::{LogLevel, MemoryLog};
    use crate::agent::wire::StopStyle;

    /// Stand-in for a pre-existing parser that only knows structured payloads.
    struct StructuredOnly;

    impl ActionParser for StructuredOnly {
        fn parse_message(&self, message: &RawMessage) -> anyhow::Result<ParsedResponse> {
            match message {
                RawMessage::Structured(value) => {
                    let action = Action::from_json(value.clone(), "computer_use", false)?;
                    Ok(ParsedResponse::parsed("structured", action))
                }
                RawMessage::Text(_) => anyhow::bail!("text is not supported"),
            }
        }
    }

    #[test]
    fn default_loop_parses_text() {
        let mut agent = AgentLoop::new();
        let parsed = agent.parse_llm_response(&RawMessage::from(
            "go\n<tool_call>\n{\"arguments\":{\"action\":\"left_click\"}}\n</tool_call>",
        ));
        assert_eq!(parsed.action.action_kind(), Some("left_click"));
        assert_eq!(agent.last_fallback, None);
        assert_eq!(agent.steps, 1);
    }

    #[test]
    fn installed_parser_keeps_previous_as_delegate() {
        let mut agent = AgentLoop::with_parser(Arc::new(StructuredOnly));
        let log = Arc::new(MemoryLog::default());
        agent.install_recovering_parser_with_log(ParserConfig::default(), log.clone());

        let structured = RawMessage::Structured(json!({"arguments": {"action": "wait"}}));
        let parsed = agent.parse_llm_response(&structured);
        assert_eq!(parsed.thoughts, "structured");
        assert_eq!(parsed.action.action_kind(), Some("wait"));

        // Text is handled by the new parser, not the delegate.
        let parsed = agent.parse_llm_response(&RawMessage::from("no idea"));
        assert_eq!(parsed.fallback, Some(ParseFailure::MissingDelimiter));
        assert_eq!(agent.last_error.as_deref(), Some("no <tool_call> block found"));

        // Delegate failure on a structured payload becomes a stop.
        let parsed = agent.parse_llm_response(&RawMessage::Structured(json!([1, 2])));
        assert!(parsed.action.is_stop());
        assert_eq!(parsed.fallback, Some(ParseFailure::DelegateFailure));
        assert_eq!(log.count(LogLevel::Error), 1);
    }

    #[test]
    fn erroring_parser_is_contained() {
        let mut agent = AgentLoop::with_parser(Arc::new(StructuredOnly));
        let parsed = agent.parse_llm_response(&RawMessage::from("thinking <tool_call>"));
        assert_eq!(parsed.thoughts, "thinking");
        assert!(parsed.action.is_stop());
        assert_eq!(agent.last_fallback, Some(ParseFailure::DelegateFailure));
        assert!(
            agent
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("text is not supported"))
        );
    }

    #[test]
    fn erroring_parser_stop_follows_stop_config() {
        let mut agent = AgentLoop::with_parser(Arc::new(StructuredOnly)).with_stop_config(
            ParserConfig {
                default_tool_name: "browser".to_string(),
                stop_style: StopStyle::Terminate,
                ..ParserConfig::default()
            },
        );
        let parsed = agent.parse_llm_response(&RawMessage::from("giving up"));
        assert_eq!(
            parsed.action.to_json(),
            json!({
                "name": "browser",
                "arguments": {"action": "terminate", "status": "failure", "thoughts": "giving up"},
            })
        );
        assert_eq!(parsed.fallback, Some(ParseFailure::DelegateFailure));
    }
}
