use std::future::Future;
use std::pin::Pin;

use super::AgentLoop;
use super::parser::{ParsedResponse, RawMessage};

pub trait LlmClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        prompt: String,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RawMessage>> + Send + 'a>>;
}

#[derive(Debug, Clone, Default)]
pub struct StepConfig {
    /// Re-prompt once when a text response falls back to a stop action.
    pub enable_repair: bool,
    /// Optional prompt suffix appended before calling the LLM.
    pub prompt_suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub response: ParsedResponse,
    pub llm_calls: u32,
}

const REPAIR_INSTRUCTION: &str = "Your previous response could not be parsed.\nThink briefly, then return exactly one <tool_call>...</tool_call> block.\nThe JSON must be an object with keys: name, arguments (arguments must include action).\n";

/// One agent step: ask the model, then parse its answer.
///
/// Transport errors from the LLM client propagate; the parse itself never fails and
/// degrades to a stop action.
pub async fn step(
    agent: &mut AgentLoop,
    llm: &dyn LlmClient,
    prompt: &str,
    cfg: &StepConfig,
) -> anyhow::Result<StepOutcome> {
    let mut prompt_str = prompt.to_string();
    if let Some(suffix) = cfg.prompt_suffix.as_deref() {
        prompt_str.push_str(suffix);
    }

    let raw = llm.complete(prompt_str.clone()).await?;
    let response = agent.parse_llm_response(&raw);

    let RawMessage::Text(raw_text) = &raw else {
        return Ok(StepOutcome {
            response,
            llm_calls: 1,
        });
    };
    if response.fallback.is_none() || !cfg.enable_repair {
        return Ok(StepOutcome {
            response,
            llm_calls: 1,
        });
    }

    tracing::info!(
        reason = response.fallback.as_ref().map(|f| f.kind()).unwrap_or("-"),
        "re-prompting after unparseable response"
    );
    let repair_prompt =
        format!("{prompt_str}\n\n[REPAIR]\n{REPAIR_INSTRUCTION}\n[INVALID_OUTPUT]\n{raw_text}\n");
    let repair_raw = llm.complete(repair_prompt).await?;
    let response = agent.parse_llm_response(&repair_raw);

    Ok(StepOutcome {
        response,
        llm_calls: 2,
    })
}
