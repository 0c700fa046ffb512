//! Agent framework primitives: `<tool_call>` extraction, recovery parsing, and the
//! per-step seam that feeds model output into the parser.
//!
//! The parser is total. Anything the model returns maps to a `(thoughts, action)` pair,
//! with a stop action standing in for output that cannot be trusted.

pub mod diagnostics;
pub mod harness;
pub mod r#loop;
pub mod parser;
pub mod repair;
pub mod wire;

pub use parser::{ActionParser, ParsedResponse, ParserConfig, RawMessage, RecoveringParser};
pub use wire::{Action, DEFAULT_TOOL_NAME, ParseFailure, StopStyle, extract_tool_call_block};

pub use r#loop::AgentLoop;
