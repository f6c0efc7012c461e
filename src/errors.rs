use thiserror::Error;

/// Errors raised by the agent runtime and its orchestration loop.
///
/// Every failure inside a task's loop is converted to one of these kinds,
/// recorded on the task, and reported over the event stream; nothing escapes
/// the runtime's scheduler.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Client-supplied input is malformed (empty goal, bad request body).
    #[error("{0}")]
    Validation(String),

    /// The planner is not configured, typically because no API key is set.
    #[error("{0}")]
    Config(String),

    /// The planner returned text that could not be parsed into a plan.
    #[error("planner returned unparsable output: {0}")]
    PlannerParse(String),

    /// The planner returned valid JSON carrying neither an action nor a
    /// finish directive.
    #[error("planner returned neither an action nor a finish directive")]
    PlannerContract,

    /// The planner transport failed (network error, non-success status).
    #[error("planner request failed: {0}")]
    Planner(String),

    /// The planned action failed tool registry validation.
    #[error("invalid action: {0}")]
    ActionValidation(String),

    /// The executor returned an error instead of an observation.
    #[error("executor failed: {0}")]
    Executor(String),

    /// The task consumed its whole step budget without finishing.
    #[error("Max step count reached without completion.")]
    StepBudgetExhausted,
}

impl AgentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn planner(message: impl Into<String>) -> Self {
        Self::Planner(message.into())
    }

    /// Stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Validation(_) => "ValidationError",
            AgentError::Config(_) => "ConfigError",
            AgentError::PlannerParse(_) => "PlannerParseError",
            AgentError::PlannerContract => "PlannerContractError",
            AgentError::Planner(_) => "PlannerError",
            AgentError::ActionValidation(_) => "ActionValidationError",
            AgentError::Executor(_) => "ExecutorError",
            AgentError::StepBudgetExhausted => "StepBudgetExhausted",
        }
    }

    /// Whether the error is the caller's fault (HTTP 400) rather than ours.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AgentError::Validation(_) | AgentError::Config(_))
    }
}
