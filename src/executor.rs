//! Executor contract: the external capability that realizes actions against
//! the browser surface, plus the safety-policy gate shared by implementations.

use async_trait::async_trait;

use crate::config::SafetyPolicy;
use crate::types::{Action, Observation, Step, Task};

/// Everything the executor receives for one action.
pub struct ExecuteRequest<'a> {
    pub task: &'a Task,
    pub step: &'a Step,
    pub action: &'a Action,
}

/// The executor's answer for one action.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub observation: Observation,
    /// Terminal signal: the task must transition after this observation.
    pub did_terminate: bool,
    /// Optional final summary accompanying a terminal observation.
    pub summary: Option<String>,
}

impl ExecutionResult {
    pub fn of(observation: Observation) -> Self {
        Self {
            observation,
            did_terminate: false,
            summary: None,
        }
    }

    pub fn terminal(observation: Observation) -> Self {
        Self {
            observation,
            did_terminate: true,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// External capability that performs actions against the real world.
///
/// Implementations report recoverable problems as an error observation and
/// fatal ones as a terminal error observation; returning `Err` is reserved
/// for faults the executor could not express as an observation, and fails
/// the task. Implementations must be safe for concurrent invocation across
/// tasks and are expected to be slow (seconds per action).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecuteRequest<'_>) -> anyhow::Result<ExecutionResult>;
}

/// Placeholder wired in when no real executor has been registered.
///
/// It terminates the task immediately instead of hanging, which keeps the
/// scheduler invariants true in misconfigured deployments.
#[derive(Debug, Default)]
pub struct NullExecutor;

#[async_trait]
impl Executor for NullExecutor {
    async fn execute(&self, request: ExecuteRequest<'_>) -> anyhow::Result<ExecutionResult> {
        Ok(ExecutionResult::terminal(Observation::error(format!(
            "No executor is registered to perform \"{}\"; aborting task.",
            request.action.kind
        ))))
    }
}

/// Check an action against the safety policy.
///
/// Returns the terminal error observation an executor must answer with when
/// the action violates the policy, or `None` when the action may proceed.
pub fn policy_violation(action: &Action, policy: &SafetyPolicy) -> Option<Observation> {
    match action.kind.as_str() {
        "navigate" => {
            let url = action.param_str("url")?.trim();
            let blocked = policy
                .blocked_origins
                .iter()
                .any(|prefix| url.starts_with(prefix.as_str()));
            if blocked {
                return Some(Observation::error(format!(
                    "Navigation to \"{url}\" is blocked by safety policy."
                )));
            }
            None
        }
        "click" | "type" => {
            let selector = action.param_str("selector")?.trim();
            let restricted = policy
                .restricted_selectors
                .iter()
                .any(|candidate| candidate == selector);
            if restricted {
                return Some(Observation::error(format!(
                    "Interaction with \"{selector}\" is restricted by safety policy."
                )));
            }
            None
        }
        _ => None,
    }
}

/// How an executor should serve a validated `wait` action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitDirective {
    /// Sleep for the clamped duration.
    Sleep { ms: u64 },
    /// Await a selector, bounded by the clamped timeout.
    Selector { until: String, timeout_ms: u64 },
}

/// Resolve a `wait` action into a directive with policy clamping applied.
///
/// When both `ms` and `until` are supplied, `until` wins.
pub fn wait_directive(action: &Action, policy: &SafetyPolicy) -> Option<WaitDirective> {
    if let Some(until) = action.param_str("until") {
        let timeout_ms = action
            .param_u64("timeoutMs")
            .unwrap_or(policy.max_wait_ms)
            .min(policy.max_wait_ms);
        return Some(WaitDirective::Selector {
            until: until.to_string(),
            timeout_ms,
        });
    }
    action.param_u64("ms").map(|ms| WaitDirective::Sleep {
        ms: ms.min(policy.max_wait_ms),
    })
}
