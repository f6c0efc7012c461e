//! End-to-end flows through the runtime: scheduling, the planning loop,
//! terminal transitions, and the event stream.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;

use webpilot::executor::policy_violation;
use webpilot::{
    AgentEvent, AgentRuntime, ExecuteRequest, ExecutionResult, Executor, FinishDirective,
    FinishStatus, Observation, PlanInput, PlanOutput, Planner, SafetyPolicy, ScriptedPlanner,
    StepStatus, Task, TaskId, TaskStatus,
};

/// Executor that replays a fixed queue of results.
struct ScriptedExecutor {
    results: Mutex<VecDeque<ExecutionResult>>,
}

impl ScriptedExecutor {
    fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
        }
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, _request: ExecuteRequest<'_>) -> anyhow::Result<ExecutionResult> {
        self.results
            .lock()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted executor has no result left"))
    }
}

/// Executor that always reports a fatal fault.
struct FaultyExecutor;

#[async_trait]
impl Executor for FaultyExecutor {
    async fn execute(&self, _request: ExecuteRequest<'_>) -> anyhow::Result<ExecutionResult> {
        Err(anyhow::anyhow!("no tab available"))
    }
}

/// Executor that enforces the safety policy and succeeds otherwise.
struct PolicyCheckedExecutor {
    policy: SafetyPolicy,
}

#[async_trait]
impl Executor for PolicyCheckedExecutor {
    async fn execute(&self, request: ExecuteRequest<'_>) -> anyhow::Result<ExecutionResult> {
        if let Some(observation) = policy_violation(request.action, &self.policy) {
            return Ok(ExecutionResult::terminal(observation));
        }
        Ok(ExecutionResult::of(Observation::success("ok")))
    }
}

/// Planner that stalls before finishing the task, used to observe the
/// scheduler under load.
struct StallPlanner {
    delay: Duration,
}

#[async_trait]
impl Planner for StallPlanner {
    async fn plan(&self, input: PlanInput<'_>) -> Result<PlanOutput, webpilot::AgentError> {
        tokio::time::sleep(self.delay).await;
        Ok(PlanOutput {
            thought: format!("finishing {}", input.task.goal),
            action: None,
            finish: Some(FinishDirective {
                status: FinishStatus::Success,
                summary: format!("done: {}", input.task.goal),
            }),
            caution: None,
        })
    }
}

fn policy(max_steps: usize, max_parallel_tasks: usize) -> SafetyPolicy {
    SafetyPolicy {
        max_steps,
        max_parallel_tasks,
        ..Default::default()
    }
}

async fn next_event(rx: &mut Receiver<AgentEvent>) -> AgentEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_terminal(runtime: &Arc<AgentRuntime>, id: &TaskId) -> Task {
    for _ in 0..500 {
        if let Some(task) = runtime.get_task(id) {
            if task.status.is_terminal() {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task never reached a terminal state");
}

#[tokio::test]
async fn happy_path_single_step_emits_the_full_event_sequence() {
    let runtime = AgentRuntime::new(policy(12, 1));
    runtime.set_planner(Arc::new(ScriptedPlanner::new([
        r#"{"thought":"I will open the site","action":{"type":"navigate","params":{"url":"https://example.com"}}}"#,
        r#"{"thought":"Done","finish":{"status":"success","summary":"Opened example.com"}}"#,
    ])));
    runtime.register_executor(Arc::new(ScriptedExecutor::new(vec![ExecutionResult::of(
        Observation::success("Navigated to https://example.com").with_data(
            serde_json::from_value(serde_json::json!({ "url": "https://example.com" })).unwrap(),
        ),
    )])));

    let mut rx = runtime.hub().subscribe();
    let created = runtime.create_task("Open example.com", None).unwrap();
    let task = wait_terminal(&runtime, &created.id).await;

    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.summary.as_deref(), Some("Opened example.com"));
    assert_eq!(task.steps.len(), 1);
    assert_eq!(task.steps[0].index, 0);
    assert_eq!(task.steps[0].status, StepStatus::Succeeded);
    assert!(task.steps[0].observation.is_some());

    let mut kinds = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        kinds.push(event.kind());
        if event.kind() == "task-completed" {
            break;
        }
    }
    assert_eq!(
        kinds,
        vec![
            "task-created",
            "task-started",
            "planning-started",
            "planning-finished",
            "step-created",
            "step-executing",
            "step-updated",
            "planning-started",
            "planning-finished",
            "task-completed",
        ]
    );
}

#[tokio::test]
async fn invalid_action_fails_the_task_without_creating_a_step() {
    let runtime = AgentRuntime::new(policy(12, 1));
    runtime.set_planner(Arc::new(ScriptedPlanner::new([
        r#"{"thought":"click","action":{"type":"click","params":{}}}"#,
    ])));

    let mut rx = runtime.hub().subscribe();
    let created = runtime.create_task("Click something", None).unwrap();
    let task = wait_terminal(&runtime, &created.id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task
        .last_error
        .as_deref()
        .unwrap()
        .contains("Missing required parameter \"selector\""));
    assert!(task.steps.is_empty());

    let mut kinds = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        kinds.push(event.kind());
        if event.kind() == "task-failed" {
            break;
        }
    }
    assert!(!kinds.contains(&"step-created"));
}

#[tokio::test]
async fn recoverable_executor_error_lets_the_planner_react() {
    let runtime = AgentRuntime::new(policy(12, 1));
    runtime.set_planner(Arc::new(ScriptedPlanner::new([
        r##"{"thought":"try the button","action":{"type":"click","params":{"selector":"#go"}}}"##,
        r##"{"thought":"give up","finish":{"status":"failed","summary":"Could not click."}}"##,
    ])));
    runtime.register_executor(Arc::new(ScriptedExecutor::new(vec![ExecutionResult::of(
        Observation::error("Selector not found."),
    )])));

    let mut rx = runtime.hub().subscribe();
    let created = runtime.create_task("Click the button", None).unwrap();
    let task = wait_terminal(&runtime, &created.id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.last_error.as_deref(), Some("Could not click."));
    assert_eq!(task.steps.len(), 1);
    assert_eq!(task.steps[0].status, StepStatus::Failed);

    let mut saw_failed_step_update = false;
    loop {
        let event = next_event(&mut rx).await;
        match &event {
            AgentEvent::StepUpdated { step, .. } => {
                if step.status == StepStatus::Failed {
                    saw_failed_step_update = true;
                }
            }
            AgentEvent::TaskFailed { error, .. } => {
                assert_eq!(error, "Could not click.");
                break;
            }
            _ => {}
        }
    }
    assert!(saw_failed_step_update);
}

#[tokio::test]
async fn thrown_executor_emits_task_error_then_task_failed() {
    let runtime = AgentRuntime::new(policy(12, 1));
    runtime.set_planner(Arc::new(ScriptedPlanner::new([
        r#"{"thought":"open it","action":{"type":"navigate","params":{"url":"https://example.com"}}}"#,
    ])));
    runtime.register_executor(Arc::new(FaultyExecutor));

    let mut rx = runtime.hub().subscribe();
    let created = runtime.create_task("Open example.com", None).unwrap();
    let task = wait_terminal(&runtime, &created.id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.last_error.as_deref().unwrap().contains("no tab available"));

    let mut kinds = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        kinds.push(event.kind());
        if event.kind() == "task-failed" {
            break;
        }
    }
    let error_pos = kinds.iter().position(|k| *k == "task-error").unwrap();
    let failed_pos = kinds.iter().position(|k| *k == "task-failed").unwrap();
    assert!(error_pos < failed_pos);
}

#[tokio::test]
async fn step_budget_exhaustion_fails_with_a_synthesized_summary() {
    let runtime = AgentRuntime::new(policy(3, 1));
    let scroll =
        r#"{"thought":"scrolling","action":{"type":"scroll","params":{"direction":"down"}}}"#;
    runtime.set_planner(Arc::new(ScriptedPlanner::new([scroll, scroll, scroll])));
    runtime.register_executor(Arc::new(ScriptedExecutor::new(vec![
        ExecutionResult::of(Observation::success("scrolled")),
        ExecutionResult::of(Observation::success("scrolled")),
        ExecutionResult::of(Observation::success("scrolled")),
    ])));

    let created = runtime.create_task("Scroll forever", None).unwrap();
    let task = wait_terminal(&runtime, &created.id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.steps.len(), 3);
    assert!(task
        .summary
        .as_deref()
        .unwrap()
        .contains("Max step count reached"));
}

#[tokio::test]
async fn blocked_origin_navigation_terminates_the_task_as_failed() {
    let runtime = AgentRuntime::new(policy(12, 1));
    runtime.set_planner(Arc::new(ScriptedPlanner::new([
        r#"{"thought":"poke internals","action":{"type":"navigate","params":{"url":"chrome://settings"}}}"#,
    ])));
    runtime.register_executor(Arc::new(PolicyCheckedExecutor {
        policy: SafetyPolicy::default(),
    }));

    let created = runtime.create_task("Open browser settings", None).unwrap();
    let task = wait_terminal(&runtime, &created.id).await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task
        .last_error
        .as_deref()
        .unwrap()
        .contains("blocked by safety policy"));
    assert_eq!(task.steps.len(), 1);
    assert_eq!(task.steps[0].status, StepStatus::Failed);
}

#[tokio::test]
async fn scheduler_caps_parallelism_and_admits_fifo() {
    let runtime = AgentRuntime::new(policy(12, 2));
    runtime.set_planner(Arc::new(StallPlanner {
        delay: Duration::from_millis(100),
    }));

    let mut rx = runtime.hub().subscribe();
    let mut created_order = Vec::new();
    for i in 0..5 {
        let task = runtime.create_task(&format!("task {i}"), None).unwrap();
        created_order.push(task.id.clone());
    }

    let mut running = 0usize;
    let mut max_running = 0usize;
    let mut completed = 0usize;
    let mut start_order = Vec::new();
    while completed < 5 {
        match next_event(&mut rx).await {
            AgentEvent::TaskStarted { task_id } => {
                running += 1;
                max_running = max_running.max(running);
                start_order.push(task_id);
            }
            AgentEvent::TaskCompleted { .. } => {
                running -= 1;
                completed += 1;
            }
            AgentEvent::TaskFailed { task_id, error } => {
                panic!("task {} unexpectedly failed: {error}", task_id.0);
            }
            _ => {}
        }
    }

    assert!(max_running <= 2, "observed {max_running} concurrent tasks");
    assert_eq!(start_order, created_order, "tasks did not start in FIFO order");
    for id in &created_order {
        assert_eq!(
            runtime.get_task(id).unwrap().status,
            TaskStatus::Succeeded
        );
    }
}

#[tokio::test]
async fn late_subscriber_gets_a_snapshot_then_only_new_events() {
    let runtime = AgentRuntime::new(policy(12, 1));
    runtime.set_planner(Arc::new(ScriptedPlanner::new([
        r#"{"thought":"done","finish":{"status":"success","summary":"T1 done"}}"#,
        r#"{"thought":"done","finish":{"status":"success","summary":"T2 done"}}"#,
    ])));

    let first = runtime.create_task("first task", None).unwrap();
    wait_terminal(&runtime, &first.id).await;

    let (snapshot, mut rx) = runtime.subscribe();
    assert_eq!(snapshot.tasks.len(), 1);
    assert_eq!(snapshot.tasks[0].id, first.id);
    assert_eq!(snapshot.tasks[0].status, TaskStatus::Succeeded);
    assert_eq!(snapshot.tools.len(), 7);

    let second = runtime.create_task("second task", None).unwrap();
    loop {
        let event = next_event(&mut rx).await;
        assert_eq!(event.task_id(), &second.id, "saw an event for the old task");
        if event.kind() == "task-completed" {
            break;
        }
    }
}

#[tokio::test]
async fn memory_records_the_loop_in_order() {
    let runtime = AgentRuntime::new(policy(12, 1));
    runtime.set_planner(Arc::new(ScriptedPlanner::new([
        r#"{"thought":"open it","caution":"login pages may be sensitive","action":{"type":"navigate","params":{"url":"https://example.com"}}}"#,
        r#"{"thought":"Done","finish":{"status":"success","summary":"Opened it"}}"#,
    ])));
    runtime.register_executor(Arc::new(ScriptedExecutor::new(vec![ExecutionResult::of(
        Observation::success("Navigated"),
    )])));

    let created = runtime.create_task("Open example.com", None).unwrap();
    wait_terminal(&runtime, &created.id).await;

    let entries = runtime.memory().get_recent(&created.id, 0);
    let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents[0], "open it");
    assert_eq!(contents[1], "Safety note: login pages may be sensitive");
    assert!(contents[2].starts_with("navigate "));
    assert!(contents[3].starts_with("SUCCESS: Navigated"));
    assert_eq!(contents[4], "Done");
    assert_eq!(contents[5], "Opened it");
}
