use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::planner::prompt::PromptBuilder;
use crate::planner::{parse_plan_output, PlanInput, Planner};
use crate::types::PlanOutput;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            api_base: "https://api.openai.com/v1".to_string(),
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct OpenAiPlanner {
    client: Client,
    prompt: PromptBuilder,
    config: OpenAiConfig,
}

impl OpenAiPlanner {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            prompt: PromptBuilder::new(),
            config,
        }
    }
}

#[async_trait]
impl Planner for OpenAiPlanner {
    async fn plan(&self, input: PlanInput<'_>) -> Result<PlanOutput, AgentError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: self.prompt.system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.prompt.build_user_prompt(&input),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::planner(format!("openai request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(AgentError::planner(format!(
                "openai returned {status}: {text}"
            )));
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| AgentError::planner(format!("openai response invalid: {err}")))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_text())
            .ok_or_else(|| AgentError::planner("openai response missing content"))?;

        parse_plan_output(&content)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: ChatCompletionContent,
}

/// Chat content arrives either as a bare string or as typed parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionPart>),
}

impl ChatCompletionContent {
    fn as_text(&self) -> Option<String> {
        match self {
            ChatCompletionContent::Text(value) => Some(value.clone()),
            ChatCompletionContent::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|part| part.text.as_ref())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPart {
    #[serde(default)]
    text: Option<String>,
}
