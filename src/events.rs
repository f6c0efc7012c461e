//! Lifecycle event set and the hub that fans events out to subscribers.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::trace;
use webpilot_event_bus::{EventBus, InMemoryBus};

use crate::tools::ToolDefinition;
use crate::types::{Action, FinishDirective, Step, Task, TaskId};

/// Capacity of the broadcast channel behind the hub. Subscribers that fall
/// further behind than this observe a lag and skip ahead.
const HUB_CAPACITY: usize = 256;

/// Every lifecycle event the runtime and orchestrators emit.
///
/// Serializes to `{type, payload}` envelopes with kebab-case kinds, matching
/// what WebSocket subscribers receive on the wire.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum AgentEvent {
    #[serde(rename_all = "camelCase")]
    TaskCreated { task_id: TaskId, task: Task },
    #[serde(rename_all = "camelCase")]
    TaskUpdated { task_id: TaskId, task: Task },
    #[serde(rename_all = "camelCase")]
    TaskStarted { task_id: TaskId },
    #[serde(rename_all = "camelCase")]
    PlanningStarted { task_id: TaskId, step_count: usize },
    #[serde(rename_all = "camelCase")]
    PlanningFinished {
        task_id: TaskId,
        thought: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<Action>,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish: Option<FinishDirective>,
    },
    #[serde(rename_all = "camelCase")]
    StepCreated { task_id: TaskId, step: Step },
    #[serde(rename_all = "camelCase")]
    StepExecuting { task_id: TaskId, step: Step },
    #[serde(rename_all = "camelCase")]
    StepUpdated { task_id: TaskId, step: Step },
    #[serde(rename_all = "camelCase")]
    TaskCompleted { task_id: TaskId, summary: String },
    #[serde(rename_all = "camelCase")]
    TaskFailed { task_id: TaskId, error: String },
    #[serde(rename_all = "camelCase")]
    TaskError { task_id: TaskId, error: String },
}

impl AgentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::TaskCreated { .. } => "task-created",
            AgentEvent::TaskUpdated { .. } => "task-updated",
            AgentEvent::TaskStarted { .. } => "task-started",
            AgentEvent::PlanningStarted { .. } => "planning-started",
            AgentEvent::PlanningFinished { .. } => "planning-finished",
            AgentEvent::StepCreated { .. } => "step-created",
            AgentEvent::StepExecuting { .. } => "step-executing",
            AgentEvent::StepUpdated { .. } => "step-updated",
            AgentEvent::TaskCompleted { .. } => "task-completed",
            AgentEvent::TaskFailed { .. } => "task-failed",
            AgentEvent::TaskError { .. } => "task-error",
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            AgentEvent::TaskCreated { task_id, .. }
            | AgentEvent::TaskUpdated { task_id, .. }
            | AgentEvent::TaskStarted { task_id }
            | AgentEvent::PlanningStarted { task_id, .. }
            | AgentEvent::PlanningFinished { task_id, .. }
            | AgentEvent::StepCreated { task_id, .. }
            | AgentEvent::StepExecuting { task_id, .. }
            | AgentEvent::StepUpdated { task_id, .. }
            | AgentEvent::TaskCompleted { task_id, .. }
            | AgentEvent::TaskFailed { task_id, .. }
            | AgentEvent::TaskError { task_id, .. } => task_id,
        }
    }
}

/// State handed to a subscriber before any live event.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub tools: Vec<ToolDefinition>,
}

/// The `{type: "snapshot", payload}` wire message for a fresh subscriber.
pub fn snapshot_message(snapshot: &Snapshot) -> Value {
    json!({ "type": "snapshot", "payload": snapshot })
}

/// Fan-out of lifecycle events to in-process and WebSocket subscribers.
///
/// Publishing never blocks on a slow subscriber: the broadcast channel drops
/// the subscriber's oldest events instead. A gate serializes publishing
/// against snapshot subscription so a subscriber's snapshot is never newer
/// than the first live event it receives.
pub struct EventHub {
    bus: Arc<InMemoryBus<AgentEvent>>,
    gate: Mutex<()>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            bus: InMemoryBus::new(HUB_CAPACITY),
            gate: Mutex::new(()),
        }
    }

    /// Publish an event to every live subscriber, best effort.
    pub fn emit(&self, event: AgentEvent) {
        let _gate = self.gate.lock();
        let delivered = self.bus.publish(event.clone());
        trace!(
            target: "events",
            kind = event.kind(),
            task = %event.task_id().0,
            subscribers = delivered,
            "event published"
        );
    }

    /// Subscribe without a snapshot (used by in-process listeners that track
    /// state themselves).
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.bus.subscribe()
    }

    /// Subscribe and build the initial snapshot atomically with respect to
    /// publishing, so no event can slip between the two.
    pub fn subscribe_with_snapshot<T>(
        &self,
        build: impl FnOnce() -> T,
    ) -> (T, broadcast::Receiver<AgentEvent>) {
        let _gate = self.gate.lock();
        let receiver = self.bus.subscribe();
        let snapshot = build();
        (snapshot, receiver)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(task_id: &TaskId) -> AgentEvent {
        AgentEvent::TaskStarted {
            task_id: task_id.clone(),
        }
    }

    #[test]
    fn events_serialize_as_type_payload_envelopes() {
        let task = Task::new("demo", None);
        let event = AgentEvent::TaskCompleted {
            task_id: task.id.clone(),
            summary: "all done".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "task-completed");
        assert_eq!(value["payload"]["summary"], "all done");
        assert_eq!(value["payload"]["taskId"], serde_json::json!(task.id.0));
    }

    #[test]
    fn kind_matches_wire_tag() {
        let task = Task::new("demo", None);
        let event = AgentEvent::TaskCreated {
            task_id: task.id.clone(),
            task,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.kind());
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_emission_order() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        let id = TaskId::new();

        hub.emit(started(&id));
        hub.emit(AgentEvent::TaskCompleted {
            task_id: id.clone(),
            summary: "ok".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap().kind(), "task-started");
        assert_eq!(rx.recv().await.unwrap().kind(), "task-completed");
    }

    #[tokio::test]
    async fn snapshot_subscription_sees_only_later_events() {
        let hub = EventHub::new();
        let id = TaskId::new();
        hub.emit(started(&id));

        let (snapshot, mut rx) = hub.subscribe_with_snapshot(|| "state");
        assert_eq!(snapshot, "state");

        hub.emit(AgentEvent::TaskCompleted {
            task_id: id.clone(),
            summary: "ok".to_string(),
        });
        // The pre-subscription event is not replayed.
        assert_eq!(rx.recv().await.unwrap().kind(), "task-completed");
    }
}
