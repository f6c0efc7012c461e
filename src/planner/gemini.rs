use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::planner::prompt::PromptBuilder;
use crate::planner::{parse_plan_output, PlanInput, Planner};
use crate::types::PlanOutput;

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct GeminiPlanner {
    client: Client,
    prompt: PromptBuilder,
    config: GeminiConfig,
}

impl GeminiPlanner {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            prompt: PromptBuilder::new(),
            config,
        }
    }
}

#[async_trait]
impl Planner for GeminiPlanner {
    async fn plan(&self, input: PlanInput<'_>) -> Result<PlanOutput, AgentError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        );
        let body = GenerateContentRequest {
            system_instruction: ContentPayload {
                role: None,
                parts: vec![Part {
                    text: self.prompt.system_prompt().to_string(),
                }],
            },
            contents: vec![ContentPayload {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: self.prompt.build_user_prompt(&input),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::planner(format!("gemini request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(AgentError::planner(format!(
                "gemini returned {status}: {text}"
            )));
        }

        let response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| AgentError::planner(format!("gemini response invalid: {err}")))?;

        let content = response
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if content.is_empty() {
            return Err(AgentError::planner("gemini response missing content"));
        }

        parse_plan_output(&content)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: ContentPayload,
    contents: Vec<ContentPayload>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct ContentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}
