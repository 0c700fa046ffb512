//! End-to-end checks of the parser contract as seen by a host agent.

use std::sync::Arc;

use computer_agent_core::agent::diagnostics::{LogLevel, MemoryLog};
use computer_agent_core::agent::{
    ActionParser, ParseFailure, ParsedResponse, ParserConfig, RawMessage, RecoveringParser,
};
use serde_json::json;

fn parser() -> (RecoveringParser, Arc<MemoryLog>) {
    let log = Arc::new(MemoryLog::default());
    (
        RecoveringParser::new(ParserConfig::default()).with_log(log.clone()),
        log,
    )
}

/// Every returned action must carry a string name and an object of arguments.
fn assert_well_formed(parsed: &ParsedResponse) {
    let value = parsed.action.to_json();
    assert!(value["name"].is_string(), "bad action: {value}");
    assert!(value["arguments"].is_object(), "bad action: {value}");
    if parsed.fallback.is_some() {
        assert!(parsed.action.is_stop());
        assert_eq!(
            parsed.action.arguments.get("thoughts"),
            Some(&json!(parsed.thoughts))
        );
    }
}

#[test]
fn never_fails_on_hostile_text() {
    let (parser, _log) = parser();
    let inputs = [
        "",
        "   ",
        "<tool_call>",
        "</tool_call>",
        "<tool_call></tool_call>",
        "<tool_call>\n\n</tool_call>",
        "<tool_call>null</tool_call>",
        "<tool_call>\"computer_use\"</tool_call>",
        "<tool_call>{\"arguments\": null}</tool_call>",
        "<tool_call>{\"name\": [], \"arguments\": {}}</tool_call>",
        "<tool_call>{\"arguments\": {}} trailing</tool_call>",
        "<tool_call><tool_call>{}</tool_call></tool_call>",
        "{\"unterminated\": ",
        "[1, 2, 3]",
        "思考中…<tool_call>{\"arguments\":{\"action\":\"type\",\"text\":\"你好\"}}</tool_call>",
        "\u{0}\u{1}<tool_call>\u{7f}</tool_call>",
    ];
    for input in inputs {
        let parsed = parser.parse(&RawMessage::from(input));
        assert_well_formed(&parsed);
    }

    let long = format!("<tool_call>{}", "{".repeat(100_000));
    assert_well_formed(&parser.parse(&RawMessage::from(long)));
}

#[test]
fn non_json_without_block_is_trimmed_stop() {
    let (parser, log) = parser();
    for input in ["  maybe scroll?  ", "\n\nI'm done.\n", "{not json}"] {
        let parsed = parser.parse(&RawMessage::from(input));
        assert_eq!(parsed.thoughts, input.trim());
        assert_eq!(
            parsed.action.to_json(),
            json!({"name": "computer_use", "arguments": {"action": "stop", "thoughts": input.trim()}})
        );
    }
    assert_eq!(log.count(LogLevel::Warn), 3);
}

#[test]
fn unterminated_block_logs_error() {
    let (parser, log) = parser();
    let parsed = parser.parse(&RawMessage::from(
        "Typing.\n<tool_call>\n{\"name\":\"computer_use\",\"arguments\":{\"action\":\"type\"}}\n",
    ));
    assert!(parsed.action.is_stop());
    assert_eq!(parsed.thoughts, "Typing.");
    assert_eq!(log.count(LogLevel::Error), 1);
}

#[test]
fn canonical_click() {
    let (parser, _log) = parser();
    let (thoughts, action) = parser
        .parse(&RawMessage::from(
            "I will click.\n<tool_call>\n{\"name\":\"computer_use\",\"arguments\":{\"action\":\"click\",\"coordinate\":[1,2]}}\n</tool_call>",
        ))
        .into_pair();
    assert_eq!(thoughts, "I will click.");
    assert_eq!(
        action.to_json(),
        json!({"name":"computer_use","arguments":{"action":"click","coordinate":[1,2]}})
    );
}

#[test]
fn nameless_stop_gets_default_name() {
    let (parser, _log) = parser();
    let parsed = parser.parse(&RawMessage::from(
        "<tool_call>{\"arguments\":{\"action\":\"stop\"}}</tool_call>",
    ));
    assert_eq!(parsed.action.name, "computer_use");
    assert_eq!(parsed.action.arguments["action"], json!("stop"));
    assert_eq!(parsed.fallback, None);
}

#[test]
fn json_array_block_warns() {
    let (parser, log) = parser();
    let parsed = parser.parse(&RawMessage::from("<tool_call>[\"click\"]</tool_call>"));
    assert!(parsed.action.is_stop());
    assert!(matches!(parsed.fallback, Some(ParseFailure::ShapeMismatch(_))));
    assert_eq!(log.count(LogLevel::Warn), 1);
    assert_eq!(log.count(LogLevel::Error), 0);
}

#[test]
fn well_formed_blocks_round_trip() {
    let (parser, _log) = parser();
    let first = parser.parse(&RawMessage::from(
        "Scrolling.\n<tool_call>\n{\"name\":\"computer_use\",\"arguments\":{\"action\":\"scroll\",\"pixels\":-300},\"confirm\":false}\n</tool_call>",
    ));
    assert_eq!(first.fallback, None);

    let again = parser.parse(&RawMessage::from(format!(
        "{}\n{}",
        first.thoughts,
        first.action.to_tool_call_block()
    )));
    assert_eq!(again, first);
}

#[test]
fn escaped_markers_in_arguments_round_trip() {
    let (parser, _log) = parser();
    let first = parser.parse(&RawMessage::from(
        "Typing markup.\n<tool_call>{\"arguments\":{\"action\":\"type\",\"text\":\"<tool_call>{}<\\/tool_call>\"}}</tool_call>",
    ));
    assert_eq!(first.fallback, None);
    assert_eq!(first.action.arguments["text"], json!("<tool_call>{}</tool_call>"));

    let again = parser.parse(&RawMessage::from(format!(
        "{}\n{}",
        first.thoughts,
        first.action.to_tool_call_block()
    )));
    assert_eq!(again, first);
}

#[test]
fn structured_input_without_delegate() {
    let (parser, _log) = parser();
    let parsed = parser.parse(&RawMessage::Structured(json!({"arguments": {"action": "click"}})));
    assert_eq!(parsed.thoughts, "");
    assert!(parsed.action.is_stop());
}

struct FailingDelegate;

impl ActionParser for FailingDelegate {
    fn parse_message(&self, _message: &RawMessage) -> anyhow::Result<ParsedResponse> {
        anyhow::bail!("legacy parser cannot handle this payload")
    }
}

#[test]
fn failing_delegate_is_caught() {
    let (parser, log) = parser();
    let parser = parser.with_delegate(Arc::new(FailingDelegate));
    let parsed = parser.parse(&RawMessage::Structured(json!({"foo": 1})));
    assert!(parsed.action.is_stop());
    assert_eq!(parsed.fallback, Some(ParseFailure::DelegateFailure));
    assert_eq!(log.count(LogLevel::Error), 1);
}

#[test]
fn parser_is_shareable_across_threads() {
    let (parser, log) = parser();
    let parser = Arc::new(parser);
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let parser = parser.clone();
            std::thread::spawn(move || {
                let raw = format!(
                    "step {i}\n<tool_call>{{\"arguments\":{{\"action\":\"wait\",\"seconds\":{i}}}}}</tool_call>"
                );
                parser.parse(&RawMessage::from(raw))
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let parsed = handle.join().expect("parser thread panicked");
        assert_eq!(parsed.thoughts, format!("step {i}"));
        assert_eq!(parsed.action.arguments["seconds"], json!(i));
    }
    assert!(log.events().is_empty());
}
