//! Planner contract, output parsing, and the provider implementations.

mod anthropic;
mod gemini;
mod openai;
pub mod prompt;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::{ModelProvider, SafetyPolicy, Settings};
use crate::errors::AgentError;
use crate::tools::ToolDefinition;
use crate::types::{MemoryEntry, PlanOutput, Task};

pub use anthropic::{AnthropicConfig, AnthropicPlanner};
pub use gemini::{GeminiConfig, GeminiPlanner};
pub use openai::{OpenAiConfig, OpenAiPlanner};

/// Everything the orchestrator hands the planner for one loop iteration.
pub struct PlanInput<'a> {
    pub task: &'a Task,
    pub recent_memory: &'a [MemoryEntry],
    pub tools: &'a [ToolDefinition],
    pub step_count: usize,
    pub policy: &'a SafetyPolicy,
}

/// External planning capability, typically backed by a language model.
///
/// Implementations are safe for concurrent invocation across tasks.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, input: PlanInput<'_>) -> Result<PlanOutput, AgentError>;
}

/// Parse the planner's free text into a structured plan.
///
/// The text is first parsed directly; if that fails, the substring between
/// the first `{` and the last `}` is re-attempted, which tolerates prose and
/// code-fence wrappers. Missing fields are never repaired here.
pub fn parse_plan_output(raw: &str) -> Result<PlanOutput, AgentError> {
    let trimmed = raw.trim();
    if let Ok(plan) = serde_json::from_str::<PlanOutput>(trimmed) {
        return Ok(plan);
    }
    if let Some(candidate) = extract_json_object(trimmed) {
        if let Ok(plan) = serde_json::from_str::<PlanOutput>(candidate) {
            return Ok(plan);
        }
    }
    Err(AgentError::PlannerParse(preview(raw)))
}

/// The substring spanning the first `{` through the last `}`, if any.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

fn preview(raw: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = raw.trim();
    if trimmed.len() <= LIMIT {
        trimmed.to_string()
    } else {
        let cut = trimmed
            .char_indices()
            .take_while(|(idx, _)| *idx < LIMIT)
            .last()
            .map(|(idx, ch)| idx + ch.len_utf8())
            .unwrap_or(0);
        format!("{}…", &trimmed[..cut])
    }
}

/// Build the planner selected by the environment settings, or `None` when no
/// credential is configured.
pub fn provider_from_settings(settings: &Settings) -> Option<Arc<dyn Planner>> {
    let api_key = settings.api_key.clone()?;
    let planner: Arc<dyn Planner> = match settings.provider {
        ModelProvider::OpenAi => Arc::new(OpenAiPlanner::new(OpenAiConfig::new(
            api_key,
            settings.model.clone(),
        ))),
        ModelProvider::Anthropic => Arc::new(AnthropicPlanner::new(AnthropicConfig::new(
            api_key,
            settings.model.clone(),
        ))),
        ModelProvider::Gemini => Arc::new(GeminiPlanner::new(GeminiConfig::new(
            api_key,
            settings.model.clone(),
        ))),
    };
    Some(planner)
}

/// Deterministic planner used in tests and offline development.
///
/// Each call pops the next scripted response and runs it through the real
/// output parser, so scripts may carry prose or fenced JSON. An optional
/// per-call latency makes scheduling behavior observable in tests.
pub struct ScriptedPlanner {
    responses: Mutex<VecDeque<String>>,
    latency: Option<Duration>,
}

impl ScriptedPlanner {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _input: PlanInput<'_>) -> Result<PlanOutput, AgentError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.responses.lock().pop_front();
        match next {
            Some(raw) => parse_plan_output(&raw),
            None => Err(AgentError::planner("scripted planner has no response left")),
        }
    }
}
