//! Per-task perceive-plan-act loop.
//!
//! One orchestrator drives exactly one task for the duration of `run`. It
//! borrows its capabilities (store, memory, registry, planner, executor,
//! event hub) from the runtime; nothing here outlives the call.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::SafetyPolicy;
use crate::errors::AgentError;
use crate::events::{AgentEvent, EventHub};
use crate::executor::{ExecuteRequest, Executor};
use crate::memory::MemoryStore;
use crate::metrics;
use crate::planner::{PlanInput, Planner};
use crate::runtime::TaskStore;
use crate::tools::ToolRegistry;
use crate::types::{
    FinishStatus, MemoryEntry, MemoryEntryKind, Observation, Step, TaskId, TaskStatus,
};

/// Memory entries fetched when preparing a planner call; the prompt builder
/// renders the tail of this window.
const PLANNING_MEMORY_WINDOW: isize = 16;

pub struct Orchestrator {
    store: Arc<TaskStore>,
    memory: Arc<MemoryStore>,
    registry: Arc<ToolRegistry>,
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    hub: Arc<EventHub>,
    policy: SafetyPolicy,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TaskStore>,
        memory: Arc<MemoryStore>,
        registry: Arc<ToolRegistry>,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        hub: Arc<EventHub>,
        policy: SafetyPolicy,
    ) -> Self {
        Self {
            store,
            memory,
            registry,
            planner,
            executor,
            hub,
            policy,
        }
    }

    /// Drive the task to a terminal state.
    ///
    /// Loop errors are converted into a terminal `failed` transition and
    /// reported through the event stream; `Err` is returned only for faults
    /// the loop cannot attribute to the task (e.g. the task vanished).
    pub async fn run(&self, task_id: &TaskId) -> Result<(), AgentError> {
        self.store
            .with_task(task_id, |task| {
                task.status = TaskStatus::Running;
                task.touch();
            })
            .ok_or_else(|| AgentError::validation("task not found in store"))?;
        self.hub.emit(AgentEvent::TaskStarted {
            task_id: task_id.clone(),
        });
        info!(target: "orchestrator", task = %task_id.0, "task started");

        for step_count in 0..self.policy.max_steps {
            let recent = self.memory.get_recent(task_id, PLANNING_MEMORY_WINDOW);
            self.hub.emit(AgentEvent::PlanningStarted {
                task_id: task_id.clone(),
                step_count,
            });

            let task_snapshot = self.snapshot(task_id)?;
            let plan = match self
                .planner
                .plan(PlanInput {
                    task: &task_snapshot,
                    recent_memory: &recent,
                    tools: self.registry.list(),
                    step_count,
                    policy: &self.policy,
                })
                .await
            {
                Ok(plan) => plan,
                Err(err) => {
                    self.fail_with_error(task_id, &err);
                    return Ok(());
                }
            };

            self.memory.remember(
                task_id,
                MemoryEntry::new(MemoryEntryKind::Thought, plan.thought.clone()),
            );
            self.hub.emit(AgentEvent::PlanningFinished {
                task_id: task_id.clone(),
                thought: plan.thought.clone(),
                action: plan.action.clone(),
                finish: plan.finish.clone(),
            });

            if let Some(caution) = plan.caution.as_deref() {
                self.memory.remember(
                    task_id,
                    MemoryEntry::new(MemoryEntryKind::Thought, format!("Safety note: {caution}")),
                );
            }

            if let Some(finish) = plan.finish {
                debug!(
                    target: "orchestrator",
                    task = %task_id.0,
                    status = ?finish.status,
                    "planner finished the task"
                );
                self.finish(task_id, finish.status, finish.summary, true);
                return Ok(());
            }

            let Some(action) = plan.action else {
                self.fail_with_error(task_id, &AgentError::PlannerContract);
                return Ok(());
            };

            if let Err(issues) = self.registry.validate(&action) {
                let err = AgentError::ActionValidation(issues.join("; "));
                self.fail_with_error(task_id, &err);
                return Ok(());
            }

            let step = self
                .store
                .with_task(task_id, |task| {
                    let step = Step::new(task.steps.len(), action.clone(), plan.thought.clone());
                    task.steps.push(step.clone());
                    task.touch();
                    step
                })
                .ok_or_else(|| AgentError::validation("task vanished mid-loop"))?;
            self.hub.emit(AgentEvent::StepCreated {
                task_id: task_id.clone(),
                step: step.clone(),
            });

            let params = serde_json::to_string(&action.params).unwrap_or_default();
            self.memory.remember(
                task_id,
                MemoryEntry::new(
                    MemoryEntryKind::Action,
                    format!("{} {}", action.kind, params),
                ),
            );
            self.hub.emit(AgentEvent::StepExecuting {
                task_id: task_id.clone(),
                step: step.clone(),
            });

            let task_snapshot = self.snapshot(task_id)?;
            let execution = match self
                .executor
                .execute(ExecuteRequest {
                    task: &task_snapshot,
                    step: &step,
                    action: &action,
                })
                .await
            {
                Ok(result) => result,
                Err(fault) => {
                    let err = AgentError::Executor(fault.to_string());
                    self.memory.remember(
                        task_id,
                        MemoryEntry::new(MemoryEntryKind::Observation, format!("ERROR: {err}")),
                    );
                    self.hub.emit(AgentEvent::TaskError {
                        task_id: task_id.clone(),
                        error: err.to_string(),
                    });
                    self.fail_with_error(task_id, &err);
                    return Ok(());
                }
            };

            let observation = execution.observation.clone();
            let finalized = self
                .store
                .with_task(task_id, |task| {
                    task.steps[step.index].finalize(observation.clone());
                    task.touch();
                    task.steps[step.index].clone()
                })
                .ok_or_else(|| AgentError::validation("task vanished mid-loop"))?;

            let label = if observation.is_success() {
                "SUCCESS"
            } else {
                "ERROR"
            };
            let mut entry = MemoryEntry::new(
                MemoryEntryKind::Observation,
                format!("{label}: {}", observation.message),
            );
            if let Some(data) = observation.data.clone() {
                entry = entry.with_metadata(data);
            }
            self.memory.remember(task_id, entry);
            self.hub.emit(AgentEvent::StepUpdated {
                task_id: task_id.clone(),
                step: finalized,
            });
            metrics::record_step_executed();

            if execution.did_terminate {
                let status = if observation.is_success() {
                    FinishStatus::Success
                } else {
                    FinishStatus::Failed
                };
                let (summary, record_summary) = match execution.summary {
                    Some(summary) => (summary, true),
                    None => {
                        let snapshot = self.snapshot(task_id)?;
                        // summarise already appends the summary memory entry.
                        (self.memory.summarise(&snapshot, &observation), false)
                    }
                };
                debug!(
                    target: "orchestrator",
                    task = %task_id.0,
                    status = ?status,
                    "executor terminated the task"
                );
                self.finish(task_id, status, summary, record_summary);
                return Ok(());
            }
        }

        // Step budget exhausted without a finish.
        let observation = Observation::error(AgentError::StepBudgetExhausted.to_string());
        let snapshot = self.snapshot(task_id)?;
        let summary = self.memory.summarise(&snapshot, &observation);
        warn!(
            target: "orchestrator",
            task = %task_id.0,
            max_steps = self.policy.max_steps,
            "step budget exhausted"
        );
        metrics::record_loop_failure(AgentError::StepBudgetExhausted.kind());
        self.finish(task_id, FinishStatus::Failed, summary, false);
        Ok(())
    }

    fn snapshot(&self, task_id: &TaskId) -> Result<crate::types::Task, AgentError> {
        self.store
            .get(task_id)
            .ok_or_else(|| AgentError::validation("task vanished mid-loop"))
    }

    /// Terminal transition shared by planner finishes, terminal observations,
    /// and budget exhaustion.
    fn finish(&self, task_id: &TaskId, status: FinishStatus, summary: String, record_memory: bool) {
        match status {
            FinishStatus::Success => {
                self.store.with_task(task_id, |task| {
                    task.status = TaskStatus::Succeeded;
                    task.summary = Some(summary.clone());
                    task.touch();
                });
                if record_memory {
                    self.memory.remember(
                        task_id,
                        MemoryEntry::new(MemoryEntryKind::Summary, summary.clone()),
                    );
                }
                self.hub.emit(AgentEvent::TaskCompleted {
                    task_id: task_id.clone(),
                    summary,
                });
                metrics::record_task_finished("succeeded");
                info!(target: "orchestrator", task = %task_id.0, "task completed");
            }
            FinishStatus::Failed => {
                self.store.with_task(task_id, |task| {
                    task.status = TaskStatus::Failed;
                    task.last_error = Some(summary.clone());
                    task.summary = Some(summary.clone());
                    task.touch();
                });
                self.hub.emit(AgentEvent::TaskFailed {
                    task_id: task_id.clone(),
                    error: summary.clone(),
                });
                metrics::record_task_finished("failed");
                warn!(target: "orchestrator", task = %task_id.0, error = %summary, "task failed");
            }
        }
    }

    /// Terminal `failed` transition for loop errors.
    fn fail_with_error(&self, task_id: &TaskId, err: &AgentError) {
        let message = err.to_string();
        self.store.with_task(task_id, |task| {
            task.status = TaskStatus::Failed;
            task.last_error = Some(message.clone());
            task.touch();
        });
        self.hub.emit(AgentEvent::TaskFailed {
            task_id: task_id.clone(),
            error: message.clone(),
        });
        metrics::record_task_finished("failed");
        metrics::record_loop_failure(err.kind());
        warn!(
            target: "orchestrator",
            task = %task_id.0,
            kind = err.kind(),
            error = %message,
            "task failed"
        );
    }
}
