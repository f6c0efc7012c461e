//! Per-task memory: the append-only log of thoughts, actions, observations,
//! and summaries that primes the planner.

use dashmap::DashMap;

use crate::types::{MemoryEntry, MemoryEntryKind, Observation, Task, TaskId};

/// Default window size handed to callers that do not ask for one.
pub const DEFAULT_RECENT_LIMIT: isize = 10;

/// Concurrent store of per-task memory logs.
///
/// Entries are unbounded for the process lifetime; windowing is applied at
/// read time by `get_recent`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<TaskId, Vec<MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the task's log.
    pub fn remember(&self, task_id: &TaskId, entry: MemoryEntry) {
        self.entries
            .entry(task_id.clone())
            .or_default()
            .push(entry);
    }

    /// The last `limit` entries in insertion order. A non-positive limit
    /// returns the whole log.
    pub fn get_recent(&self, task_id: &TaskId, limit: isize) -> Vec<MemoryEntry> {
        let Some(log) = self.entries.get(task_id) else {
            return Vec::new();
        };
        if limit <= 0 {
            return log.clone();
        }
        let limit = limit as usize;
        let start = log.len().saturating_sub(limit);
        log[start..].to_vec()
    }

    /// Build a textual summary of the goal plus an observation, record it as
    /// a `summary` entry, and return it.
    ///
    /// Used when a terminal observation arrives without its own summary and
    /// when the step budget runs out.
    pub fn summarise(&self, task: &Task, observation: &Observation) -> String {
        let result = match observation.result {
            crate::types::ObservationResult::Success => "success",
            crate::types::ObservationResult::Error => "error",
        };
        let mut summary = format!(
            "Goal: {}. Outcome ({}): {}",
            task.goal.trim(),
            result,
            observation.message.trim()
        );
        if let Some(data) = &observation.data {
            if !data.is_empty() {
                let serialized = serde_json::to_string(data).unwrap_or_default();
                summary.push_str(&format!(" Data: {serialized}"));
            }
        }
        self.remember(
            &task.id,
            MemoryEntry::new(MemoryEntryKind::Summary, summary.clone()),
        );
        summary
    }

    /// Drop every entry recorded for the task.
    pub fn clear(&self, task_id: &TaskId) {
        self.entries.remove(task_id);
    }
}
