use std::io::Read;

use anyhow::Context;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use computer_agent_core::agent::{
    ParsedResponse, ParserConfig, RawMessage, RecoveringParser, StopStyle,
};

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_stop_style(raw: &str) -> anyhow::Result<StopStyle> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "stop" => Ok(StopStyle::Stop),
        "terminate" => Ok(StopStyle::Terminate),
        other => anyhow::bail!("unknown stop style: {other} (expected stop|terminate)"),
    }
}

fn load_config() -> anyhow::Result<ParserConfig> {
    let mut config = match env_nonempty("COMPUTER_AGENT_PARSER_CONFIG") {
        Some(rel) => ParserConfig::load(&rel)?,
        None => ParserConfig::default(),
    };
    if let Some(style) = env_nonempty("COMPUTER_AGENT_STOP_STYLE") {
        config.stop_style = parse_stop_style(&style)?;
    }
    Ok(config)
}

fn read_input(path: Option<&str>) -> anyhow::Result<String> {
    match path {
        Some(path) if path != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("read model response from {path}")),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read model response from stdin")?;
            Ok(buf)
        }
    }
}

fn render(parsed: &ParsedResponse) -> serde_json::Value {
    json!({
        "thoughts": parsed.thoughts,
        "action": parsed.action.to_json(),
        "fallback": parsed.fallback.as_ref().map(|f| f.kind()),
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;
    tracing::debug!(?config, "parser config loaded");

    let path = std::env::args().nth(1);
    let input = read_input(path.as_deref())?;

    let parser = RecoveringParser::new(config);
    let parsed = parser.parse(&RawMessage::Text(input));
    tracing::info!(
        action = parsed.action.action_kind().unwrap_or("-"),
        fallback = parsed.fallback.as_ref().map(|f| f.kind()).unwrap_or("-"),
        "parsed model response"
    );

    println!("{}", serde_json::to_string_pretty(&render(&parsed))?);
    Ok(())
}
