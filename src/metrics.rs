//! Prometheus counters for task and loop outcomes.

use once_cell::sync::{Lazy, OnceCell};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();
static TASKS_CREATED: OnceCell<IntCounter> = OnceCell::new();
static TASKS_FINISHED: OnceCell<IntCounterVec> = OnceCell::new();
static STEPS_EXECUTED: OnceCell<IntCounter> = OnceCell::new();
static LOOP_FAILURES: OnceCell<IntCounterVec> = OnceCell::new();

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();

        let created = IntCounter::new(
            "webpilot_tasks_created_total",
            "Tasks accepted by the runtime",
        )
        .expect("create tasks counter");
        if let Err(err) = registry.register(Box::new(created.clone())) {
            error!(?err, "failed to register tasks-created counter");
        }
        let _ = TASKS_CREATED.set(created);

        let finished = IntCounterVec::new(
            Opts::new(
                "webpilot_tasks_finished_total",
                "Tasks that reached a terminal state, by status",
            ),
            &["status"],
        )
        .expect("create tasks-finished counter");
        if let Err(err) = registry.register(Box::new(finished.clone())) {
            error!(?err, "failed to register tasks-finished counter");
        }
        let _ = TASKS_FINISHED.set(finished);

        let steps = IntCounter::new(
            "webpilot_steps_executed_total",
            "Steps finalized by orchestrators",
        )
        .expect("create steps counter");
        if let Err(err) = registry.register(Box::new(steps.clone())) {
            error!(?err, "failed to register steps counter");
        }
        let _ = STEPS_EXECUTED.set(steps);

        let failures = IntCounterVec::new(
            Opts::new(
                "webpilot_loop_failures_total",
                "Orchestration loop failures, by error kind",
            ),
            &["kind"],
        )
        .expect("create failures counter");
        if let Err(err) = registry.register(Box::new(failures.clone())) {
            error!(?err, "failed to register failures counter");
        }
        let _ = LOOP_FAILURES.set(failures);
    });
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

pub fn record_task_created() {
    register_metrics();
    if let Some(counter) = TASKS_CREATED.get() {
        counter.inc();
    }
}

pub fn record_task_finished(status: &str) {
    register_metrics();
    if let Some(counter) = TASKS_FINISHED.get() {
        counter.with_label_values(&[status]).inc();
    }
}

pub fn record_step_executed() {
    register_metrics();
    if let Some(counter) = STEPS_EXECUTED.get() {
        counter.inc();
    }
}

pub fn record_loop_failure(kind: &str) {
    register_metrics();
    if let Some(counter) = LOOP_FAILURES.get() {
        counter.with_label_values(&[kind]).inc();
    }
}

/// Text exposition of the registry, or `None` when encoding fails.
pub fn render() -> Option<String> {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&global_registry().gather(), &mut buffer) {
        error!(?err, "failed to encode prometheus metrics");
        return None;
    }
    match String::from_utf8(buffer) {
        Ok(body) => Some(body),
        Err(err) => {
            error!(?err, "failed to convert prometheus metrics to utf8");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_rendered_output() {
        record_task_created();
        record_task_finished("succeeded");
        record_step_executed();
        record_loop_failure("PlannerParseError");

        let body = render().expect("rendered metrics");
        assert!(body.contains("webpilot_tasks_created_total"));
        assert!(body.contains("webpilot_tasks_finished_total"));
        assert!(body.contains("webpilot_loop_failures_total"));
    }
}
