//! Task store, FIFO queue, and the bounded-parallelism scheduler.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::SafetyPolicy;
use crate::errors::AgentError;
use crate::events::{AgentEvent, EventHub, Snapshot};
use crate::executor::{Executor, NullExecutor};
use crate::memory::MemoryStore;
use crate::metrics;
use crate::orchestrator::Orchestrator;
use crate::planner::Planner;
use crate::tools::ToolRegistry;
use crate::types::{Task, TaskContext, TaskId, TaskStatus};

/// Exclusive owner of every task for the process lifetime.
///
/// Orchestrators mutate tasks only through `with_task`, so each mutation is
/// a single critical section and readers always observe a complete task.
#[derive(Debug, Default)]
pub struct TaskStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    tasks: HashMap<TaskId, Task>,
    /// Creation order, oldest first.
    order: Vec<TaskId>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, task: Task) {
        let mut inner = self.inner.write();
        inner.order.push(task.id.clone());
        inner.tasks.insert(task.id.clone(), task);
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.inner.read().tasks.get(id).cloned()
    }

    /// All tasks, most recently created first.
    pub fn list(&self) -> Vec<Task> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    pub fn with_task<R>(&self, id: &TaskId, mutate: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        inner.tasks.get_mut(id).map(mutate)
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    queue: VecDeque<TaskId>,
    active: HashSet<TaskId>,
}

/// The runtime: owns the store, the memory, the hub, and the scheduler, and
/// spawns one orchestration per admitted task.
pub struct AgentRuntime {
    policy: SafetyPolicy,
    store: Arc<TaskStore>,
    memory: Arc<MemoryStore>,
    registry: Arc<ToolRegistry>,
    hub: Arc<EventHub>,
    planner: RwLock<Option<Arc<dyn Planner>>>,
    executor: RwLock<Arc<dyn Executor>>,
    scheduler: Mutex<SchedulerState>,
}

impl AgentRuntime {
    pub fn new(policy: SafetyPolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            store: Arc::new(TaskStore::new()),
            memory: Arc::new(MemoryStore::new()),
            registry: Arc::new(ToolRegistry::builtin()),
            hub: Arc::new(EventHub::new()),
            planner: RwLock::new(None),
            executor: RwLock::new(Arc::new(NullExecutor)),
            scheduler: Mutex::new(SchedulerState::default()),
        })
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Install or replace the planner. Task creation is rejected until one
    /// is present.
    pub fn set_planner(&self, planner: Arc<dyn Planner>) {
        *self.planner.write() = Some(planner);
    }

    /// Replace the executor all subsequent steps are dispatched to.
    pub fn register_executor(&self, executor: Arc<dyn Executor>) {
        *self.executor.write() = executor;
    }

    /// Accept a goal, enqueue the task, and kick the scheduler.
    pub fn create_task(
        self: &Arc<Self>,
        goal: &str,
        context: Option<TaskContext>,
    ) -> Result<Task, AgentError> {
        if goal.trim().is_empty() {
            return Err(AgentError::validation("Task goal must not be empty."));
        }
        if self.planner.read().is_none() {
            return Err(AgentError::config(
                "No planner is configured; set OPENAI_API_KEY, ANTHROPIC_API_KEY, or \
                 GOOGLE_GENERATIVE_AI_API_KEY.",
            ));
        }

        let task = Task::new(goal.trim(), context);
        self.store.insert(task.clone());
        metrics::record_task_created();
        info!(target: "runtime", task = %task.id.0, goal = %task.goal, "task created");
        self.hub.emit(AgentEvent::TaskCreated {
            task_id: task.id.clone(),
            task: task.clone(),
        });

        self.scheduler.lock().queue.push_back(task.id.clone());
        self.drain();
        Ok(task)
    }

    pub fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.store.get(id)
    }

    /// All tasks, most recently created first.
    pub fn list_tasks(&self) -> Vec<Task> {
        self.store.list()
    }

    /// Shallow-merge a context patch into the task and notify subscribers.
    pub fn update_task_context(
        &self,
        id: &TaskId,
        patch: TaskContext,
    ) -> Result<Task, AgentError> {
        let updated = self
            .store
            .with_task(id, |task| {
                task.context.get_or_insert_with(TaskContext::default).merge(patch);
                task.touch();
                task.clone()
            })
            .ok_or_else(|| AgentError::validation("Task not found."))?;
        self.hub.emit(AgentEvent::TaskUpdated {
            task_id: updated.id.clone(),
            task: updated.clone(),
        });
        Ok(updated)
    }

    /// State handed to a fresh subscriber.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tasks: self.store.list(),
            tools: self.registry.list().to_vec(),
        }
    }

    /// Subscribe to the event stream with a coherent initial snapshot.
    pub fn subscribe(
        &self,
    ) -> (
        Snapshot,
        tokio::sync::broadcast::Receiver<AgentEvent>,
    ) {
        self.hub.subscribe_with_snapshot(|| self.snapshot())
    }

    /// Admit queued tasks while capacity is available, strictly FIFO.
    fn drain(self: &Arc<Self>) {
        loop {
            let next = {
                let mut scheduler = self.scheduler.lock();
                if scheduler.active.len() >= self.policy.max_parallel_tasks {
                    None
                } else {
                    scheduler.queue.pop_front().map(|id| {
                        scheduler.active.insert(id.clone());
                        id
                    })
                }
            };
            let Some(task_id) = next else { break };
            self.spawn_orchestration(task_id);
        }
    }

    fn spawn_orchestration(self: &Arc<Self>, task_id: TaskId) {
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            let planner = runtime.planner.read().clone();
            match planner {
                Some(planner) => {
                    let executor = runtime.executor.read().clone();
                    let orchestrator = Orchestrator::new(
                        Arc::clone(&runtime.store),
                        Arc::clone(&runtime.memory),
                        Arc::clone(&runtime.registry),
                        planner,
                        executor,
                        Arc::clone(&runtime.hub),
                        runtime.policy.clone(),
                    );
                    if let Err(err) = orchestrator.run(&task_id).await {
                        error!(
                            target: "runtime",
                            task = %task_id.0,
                            error = %err,
                            "orchestration aborted"
                        );
                        runtime.fail_abandoned(&task_id, &err.to_string());
                    }
                }
                None => {
                    // The planner was removed between admission and spawn.
                    warn!(target: "runtime", task = %task_id.0, "no planner at spawn time");
                    runtime.fail_abandoned(&task_id, "No planner is configured.");
                }
            }
            runtime.release(&task_id);
        });
    }

    /// Mark a task failed when its orchestration could not run to a terminal
    /// state on its own; the capacity slot is released by the caller.
    fn fail_abandoned(&self, task_id: &TaskId, message: &str) {
        let failed = self
            .store
            .with_task(task_id, |task| {
                if task.status.is_terminal() {
                    false
                } else {
                    task.status = TaskStatus::Failed;
                    task.last_error = Some(message.to_string());
                    task.touch();
                    true
                }
            })
            .unwrap_or(false);
        if failed {
            self.hub.emit(AgentEvent::TaskFailed {
                task_id: task_id.clone(),
                error: message.to_string(),
            });
            metrics::record_task_finished("failed");
        }
    }

    fn release(self: &Arc<Self>, task_id: &TaskId) {
        self.scheduler.lock().active.remove(task_id);
        self.drain();
    }
}
