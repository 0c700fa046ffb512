//! Where the parser reports the fallback paths it took.
//!
//! The parser never returns errors, so logging is the only channel that records why a stop
//! action was substituted. Hosts pick the sink; `TracingLog` is the default.

use std::sync::Mutex;

use super::wire::ParseFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Warn,
    Error,
}

impl LogLevel {
    pub fn for_failure(failure: &ParseFailure) -> Self {
        match failure {
            ParseFailure::MissingDelimiter
            | ParseFailure::ShapeMismatch(_)
            | ParseFailure::UnsupportedPayload => LogLevel::Warn,
            ParseFailure::UnterminatedBlock
            | ParseFailure::DecodeFailure
            | ParseFailure::DelegateFailure => LogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEvent {
    pub level: LogLevel,
    /// Stable failure identifier, see `ParseFailure::kind`.
    pub kind: &'static str,
    pub message: String,
    /// Type name of the underlying error, when there is one.
    pub error_type: Option<String>,
    /// Raw model text, already truncated.
    pub preview: Option<String>,
}

pub trait ParseLog: Send + Sync {
    fn emit(&self, event: ParseEvent);
}

/// Forwards parse events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl ParseLog for TracingLog {
    fn emit(&self, event: ParseEvent) {
        let error_type = event.error_type.as_deref().unwrap_or("-");
        let preview = event.preview.as_deref().unwrap_or("");
        match event.level {
            LogLevel::Warn => tracing::warn!(
                target: "computer_agent_core::parser",
                kind = event.kind,
                error_type,
                preview,
                "{}",
                event.message
            ),
            LogLevel::Error => tracing::error!(
                target: "computer_agent_core::parser",
                kind = event.kind,
                error_type,
                preview,
                "{}",
                event.message
            ),
        }
    }
}

/// Keeps every event in memory. Handy for tests and for hosts that surface parse issues
/// next to the step they belong to.
#[derive(Debug, Default)]
pub struct MemoryLog {
    events: Mutex<Vec<ParseEvent>>,
}

impl MemoryLog {
    pub fn events(&self) -> Vec<ParseEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.events().iter().filter(|e| e.level == level).count()
    }
}

impl ParseLog for MemoryLog {
    fn emit(&self, event: ParseEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::wire::ShapeError;

    #[test]
    fn levels_follow_failure_severity() {
        assert_eq!(
            LogLevel::for_failure(&ParseFailure::MissingDelimiter),
            LogLevel::Warn
        );
        assert_eq!(
            LogLevel::for_failure(&ParseFailure::ShapeMismatch(ShapeError::MissingArguments)),
            LogLevel::Warn
        );
        assert_eq!(
            LogLevel::for_failure(&ParseFailure::UnterminatedBlock),
            LogLevel::Error
        );
        assert_eq!(
            LogLevel::for_failure(&ParseFailure::DecodeFailure),
            LogLevel::Error
        );
        assert_eq!(
            LogLevel::for_failure(&ParseFailure::DelegateFailure),
            LogLevel::Error
        );
    }

    #[test]
    fn memory_log_records_in_order() {
        let log = MemoryLog::default();
        for kind in ["a", "b"] {
            log.emit(ParseEvent {
                level: LogLevel::Warn,
                kind,
                message: kind.to_string(),
                error_type: None,
                preview: None,
            });
        }
        let kinds: Vec<_> = log.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["a", "b"]);
        assert_eq!(log.count(LogLevel::Warn), 2);
        assert_eq!(log.count(LogLevel::Error), 0);
    }
}
