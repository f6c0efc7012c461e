//! Core data model for tasks, steps, actions, observations, and memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use webpilot_core_types::{StepId, TaskId};

/// Lifecycle of a task. `Succeeded` and `Failed` are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Lifecycle of a step within a task. Steps are created `Running` and
/// finalized exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Optional page context attached to a task, either on submission or later
/// via a context patch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Initial HTML excerpt; truncated before it reaches the planner prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl TaskContext {
    /// Shallow merge: fields present on `patch` replace the current value.
    pub fn merge(&mut self, patch: TaskContext) {
        if patch.url.is_some() {
            self.url = patch.url;
        }
        if patch.title.is_some() {
            self.title = patch.title;
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
        if patch.html.is_some() {
            self.html = patch.html;
        }
    }
}

/// A tagged command from the closed tool set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Action {
    pub fn new(kind: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    pub fn param_u64(&self, name: &str) -> Option<u64> {
        self.params.get(name).and_then(Value::as_u64)
    }
}

/// Outcome of one executed action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationResult {
    Success,
    Error,
}

/// The executor's structured result of performing an action.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub result: ObservationResult,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl Observation {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            result: ObservationResult::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result: ObservationResult::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == ObservationResult::Success
    }
}

/// Terminal directive inside a plan: the planner declares the task finished.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishDirective {
    pub status: FinishStatus,
    pub summary: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishStatus {
    Success,
    Failed,
}

/// Structured output of one planner call.
///
/// `thought` is always expected; semantically at most one of `action` and
/// `finish` is honored per iteration, and a plan carrying neither is a
/// contract violation handled by the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutput {
    #[serde(default)]
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<FinishDirective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caution: Option<String>,
}

/// One iteration of plan + execute within a task.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,
    /// Position within `task.steps` at creation; dense and monotonic.
    pub index: usize,
    pub status: StepStatus,
    pub action: Action,
    pub model_thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Step {
    pub fn new(index: usize, action: Action, model_thought: String) -> Self {
        let now = Utc::now();
        Self {
            id: StepId::new(),
            index,
            status: StepStatus::Running,
            action,
            model_thought,
            observation: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Finalize the step with its observation. Called exactly once.
    pub fn finalize(&mut self, observation: Observation) {
        self.status = if observation.is_success() {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed
        };
        self.observation = Some(observation);
        self.updated_at = Utc::now();
    }
}

/// A user-submitted goal and its execution record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub goal: String,
    pub status: TaskStatus,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<TaskContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(goal: impl Into<String>, context: Option<TaskContext>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            goal: goal.into(),
            status: TaskStatus::Pending,
            steps: Vec::new(),
            summary: None,
            context,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Kind of a per-task memory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryEntryKind {
    Thought,
    Action,
    Observation,
    Summary,
}

impl MemoryEntryKind {
    /// Uppercased label used when rendering memory into the planner prompt.
    pub fn label(&self) -> &'static str {
        match self {
            MemoryEntryKind::Thought => "THOUGHT",
            MemoryEntryKind::Action => "ACTION",
            MemoryEntryKind::Observation => "OBSERVATION",
            MemoryEntryKind::Summary => "SUMMARY",
        }
    }
}

/// One line in a task's append-only memory log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    #[serde(rename = "type")]
    pub kind: MemoryEntryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl MemoryEntry {
    pub fn new(kind: MemoryEntryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
