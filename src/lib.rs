//! webpilot: an autonomous browsing-agent runtime.
//!
//! A goal submitted over HTTP becomes a task; the runtime schedules it with
//! bounded parallelism, an orchestrator drives the perceive-plan-act loop
//! against an external planner and a pluggable executor, and every lifecycle
//! transition is fanned out to HTTP/WebSocket subscribers.

pub mod config;
pub mod errors;
pub mod events;
pub mod executor;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod runtime;
pub mod server;
pub mod tools;
pub mod types;

pub use config::{ModelProvider, SafetyPolicy, Settings};
pub use errors::AgentError;
pub use events::{AgentEvent, EventHub, Snapshot};
pub use executor::{ExecuteRequest, ExecutionResult, Executor, NullExecutor};
pub use memory::MemoryStore;
pub use orchestrator::Orchestrator;
pub use planner::{PlanInput, Planner, ScriptedPlanner};
pub use runtime::{AgentRuntime, TaskStore};
pub use tools::{ToolDefinition, ToolRegistry};
pub use types::{
    Action, FinishDirective, FinishStatus, MemoryEntry, MemoryEntryKind, Observation,
    ObservationResult, PlanOutput, Step, StepId, StepStatus, Task, TaskContext, TaskId, TaskStatus,
};
