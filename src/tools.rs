//! Canonical catalog of the action kinds the planner may emit, plus the
//! shape validator that gates step creation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Action;

/// Parameter schema entry: a description plus whether the planner must
/// supply the parameter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParamSpec {
    pub description: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Execution hints surfaced to clients and to the planner prompt.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProfile {
    pub invokes_executor: bool,
    pub expected_latency_ms: u64,
}

/// A single tool in the closed action set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub schema: BTreeMap<String, ParamSpec>,
    pub execution: ExecutionProfile,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_notes: Vec<String>,
}

impl ToolDefinition {
    pub fn required_params(&self) -> Vec<&str> {
        self.schema
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn optional_params(&self) -> Vec<&str> {
        self.schema
            .iter()
            .filter(|(_, spec)| !spec.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn prompt_block(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("• {}: {}", self.name, self.description));
        let required = self.required_params();
        if !required.is_empty() {
            lines.push(format!("  Required params: {}", required.join(", ")));
        }
        let optional = self.optional_params();
        if !optional.is_empty() {
            lines.push(format!("  Optional params: {}", optional.join(", ")));
        }
        for note in &self.safety_notes {
            lines.push(format!("  Safety: {note}"));
        }
        lines.join("\n")
    }
}

/// Immutable catalog of the recognized action kinds.
///
/// The set is fixed at compile time; validation checks only the shape the
/// planner is responsible for (known kind, required parameters present).
/// Type-correctness beyond presence is the executor's concern.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn builtin() -> Self {
        Self {
            tools: builtin_tools(),
        }
    }

    pub fn list(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn get(&self, kind: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name == kind)
    }

    /// Validate an action against its tool schema.
    ///
    /// Returns the list of issues on failure. Extra parameters are tolerated
    /// for forward compatibility.
    pub fn validate(&self, action: &Action) -> Result<(), Vec<String>> {
        let Some(tool) = self.get(&action.kind) else {
            return Err(vec![format!("Unknown tool type \"{}\"", action.kind)]);
        };

        let mut issues = Vec::new();
        for (name, spec) in &tool.schema {
            if !spec.required {
                continue;
            }
            if !param_present(action, name) {
                issues.push(format!(
                    "Missing required parameter \"{}\" for tool \"{}\"",
                    name, tool.name
                ));
            }
        }

        // `wait` has no individually required parameter but needs a trigger.
        if tool.name == "wait" && !param_present(action, "ms") && !param_present(action, "until") {
            issues.push("Tool \"wait\" requires at least one of \"ms\" or \"until\"".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Render the catalog as a prompt section for the planner.
    pub fn prompt_block(&self) -> String {
        self.tools
            .iter()
            .map(ToolDefinition::prompt_block)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn param_present(action: &Action, name: &str) -> bool {
    matches!(action.params.get(name), Some(value) if !value.is_null())
}

fn tool(
    name: &str,
    description: &str,
    params: &[(&str, &str, bool)],
    invokes_executor: bool,
    expected_latency_ms: u64,
    safety_notes: &[&str],
) -> ToolDefinition {
    let schema = params
        .iter()
        .map(|(param, desc, required)| {
            (
                param.to_string(),
                ParamSpec {
                    description: desc.to_string(),
                    required: *required,
                },
            )
        })
        .collect();
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        schema,
        execution: ExecutionProfile {
            invokes_executor,
            expected_latency_ms,
        },
        safety_notes: safety_notes.iter().map(|note| note.to_string()).collect(),
    }
}

fn builtin_tools() -> Vec<ToolDefinition> {
    vec![
        tool(
            "navigate",
            "Open a URL in the active tab and wait for the page to settle.",
            &[
                ("url", "Absolute URL to open.", true),
                ("tabId", "Target tab; defaults to the active tab.", false),
                ("waitFor", "CSS selector to await after navigation.", false),
            ],
            true,
            4_000,
            &["URLs matching a blocked origin prefix are refused."],
        ),
        tool(
            "click",
            "Click an element located by CSS selector.",
            &[
                ("selector", "CSS selector of the element to click.", true),
                ("tabId", "Target tab; defaults to the active tab.", false),
                (
                    "button",
                    "Mouse button: left, right, or middle (default left).",
                    false,
                ),
                (
                    "waitForNavigation",
                    "Wait for a page load triggered by the click.",
                    false,
                ),
            ],
            true,
            1_500,
            &["Clicks on restricted selectors are refused."],
        ),
        tool(
            "type",
            "Type text into an input located by CSS selector.",
            &[
                ("selector", "CSS selector of the input element.", true),
                ("text", "Text to type.", true),
                ("tabId", "Target tab; defaults to the active tab.", false),
                ("clear", "Clear the field before typing.", false),
                ("submit", "Press Enter after typing.", false),
            ],
            true,
            2_000,
            &["Typing into restricted selectors is refused."],
        ),
        tool(
            "wait",
            "Pause until a duration elapses or a selector appears.",
            &[
                ("ms", "Milliseconds to sleep.", false),
                ("until", "CSS selector to await.", false),
                ("tabId", "Target tab; defaults to the active tab.", false),
                ("timeoutMs", "Upper bound while awaiting the selector.", false),
            ],
            true,
            5_000,
            &["Durations are clamped to the configured wait ceiling."],
        ),
        tool(
            "scroll",
            "Scroll the page in a direction or to an element.",
            &[
                (
                    "direction",
                    "One of up, down, top, or bottom.",
                    true,
                ),
                ("tabId", "Target tab; defaults to the active tab.", false),
                (
                    "amount",
                    "Pixels, or a 0-1 viewport fraction (default 0.6).",
                    false,
                ),
                ("selector", "Scroll the matched element into view.", false),
            ],
            true,
            800,
            &[],
        ),
        tool(
            "extract",
            "Read an attribute from matching elements on the current page.",
            &[
                (
                    "attribute",
                    "Attribute to read, e.g. textContent or innerHTML.",
                    true,
                ),
                ("tabId", "Target tab; defaults to the active tab.", false),
                ("selector", "CSS selector to match (default *).", false),
                ("purpose", "Why the data is needed; recorded only.", false),
            ],
            true,
            1_200,
            &["Output is capped at 10 non-empty values."],
        ),
        tool(
            "finish",
            "Declare the task finished with a final status and summary.",
            &[
                ("status", "One of success or failed.", true),
                ("summary", "Human-readable outcome summary.", true),
            ],
            false,
            0,
            &[],
        ),
    ]
}
