use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::planner::prompt::PromptBuilder;
use crate::planner::{parse_plan_output, PlanInput, Planner};
use crate::types::PlanOutput;

#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            api_base: "https://api.anthropic.com/v1".to_string(),
            temperature: 0.2,
            max_tokens: 1_024,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct AnthropicPlanner {
    client: Client,
    prompt: PromptBuilder,
    config: AnthropicConfig,
}

impl AnthropicPlanner {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            prompt: PromptBuilder::new(),
            config,
        }
    }
}

#[async_trait]
impl Planner for AnthropicPlanner {
    async fn plan(&self, input: PlanInput<'_>) -> Result<PlanOutput, AgentError> {
        let url = format!("{}/messages", self.config.api_base.trim_end_matches('/'));
        let body = MessagesRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            system: self.prompt.system_prompt().to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![ContentBlock {
                    kind: "text".to_string(),
                    text: self.prompt.build_user_prompt(&input),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::planner(format!("anthropic request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(AgentError::planner(format!(
                "anthropic returned {status}: {text}"
            )));
        }

        let response: MessagesResponse = response
            .json()
            .await
            .map_err(|err| AgentError::planner(format!("anthropic response invalid: {err}")))?;

        let content = response
            .content
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        if content.is_empty() {
            return Err(AgentError::planner("anthropic response missing content"));
        }

        parse_plan_output(&content)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    _kind: String,
    #[serde(default)]
    text: Option<String>,
}
