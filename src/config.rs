//! Environment-driven settings and the process-wide safety policy.

use tracing::warn;

const DEFAULT_MAX_STEPS: usize = 12;
const DEFAULT_MAX_PARALLEL_TASKS: usize = 1;
const DEFAULT_MAX_WAIT_MS: u64 = 15_000;

const DEFAULT_BLOCKED_ORIGINS: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "devtools://",
    "view-source:",
    "file://",
    "javascript:",
];

const DEFAULT_RESTRICTED_SELECTORS: &[&str] = &[
    "input[type=password]",
    "[data-sensitive]",
    "#payment",
    ".checkout-confirm",
];

/// Immutable bounds constructed at startup and threaded explicitly to both
/// the planner prompt and the executor-side policy gate.
#[derive(Clone, Debug)]
pub struct SafetyPolicy {
    /// Per-task step budget; guarantees loop termination.
    pub max_steps: usize,
    /// Upper bound on concurrently running tasks.
    pub max_parallel_tasks: usize,
    /// Ceiling applied to `wait` durations and timeouts.
    pub max_wait_ms: u64,
    /// URL prefixes the `navigate` tool must refuse.
    pub blocked_origins: Vec<String>,
    /// CSS selectors the `click` and `type` tools must refuse.
    pub restricted_selectors: Vec<String>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_parallel_tasks: DEFAULT_MAX_PARALLEL_TASKS,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            blocked_origins: DEFAULT_BLOCKED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            restricted_selectors: DEFAULT_RESTRICTED_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Planner provider selected via `AGENT_MODEL_PROVIDER`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelProvider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ModelProvider {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::Gemini => "gemini-1.5-flash",
        }
    }
}

/// Settings resolved from the environment at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    pub provider: ModelProvider,
    pub model: String,
    /// Credential for the selected provider; absence disables the planner
    /// and makes task creation fail with a config error.
    pub api_key: Option<String>,
    /// HTTP/WebSocket bind port; 0 lets the OS pick one.
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Self {
        let provider = resolve_provider();
        let model = non_empty_env("AGENT_MODEL")
            .unwrap_or_else(|| provider.default_model().to_string());
        let api_key = resolve_api_key(provider);
        let port = resolve_port();
        Self {
            provider,
            model,
            api_key,
            port,
        }
    }
}

fn resolve_provider() -> ModelProvider {
    match std::env::var("AGENT_MODEL_PROVIDER") {
        Ok(raw) => ModelProvider::parse(&raw).unwrap_or_else(|| {
            warn!(value = %raw, "unknown AGENT_MODEL_PROVIDER; falling back to openai");
            ModelProvider::OpenAi
        }),
        Err(_) => ModelProvider::OpenAi,
    }
}

fn resolve_api_key(provider: ModelProvider) -> Option<String> {
    match provider {
        ModelProvider::OpenAi => non_empty_env("OPENAI_API_KEY"),
        ModelProvider::Anthropic => non_empty_env("ANTHROPIC_API_KEY"),
        ModelProvider::Gemini => non_empty_env("GOOGLE_GENERATIVE_AI_API_KEY")
            .or_else(|| non_empty_env("GEMINI_API_KEY")),
    }
}

fn resolve_port() -> u16 {
    match std::env::var("AGENT_SERVER_PORT") {
        Ok(raw) => match raw.trim().parse::<u16>() {
            Ok(port) => port,
            Err(err) => {
                warn!(?err, value = %raw, "invalid AGENT_SERVER_PORT; using an OS-assigned port");
                0
            }
        },
        Err(_) => 0,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
