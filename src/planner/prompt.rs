//! Deterministic prompt assembly for the planning loop.

use crate::planner::PlanInput;

/// Memory entries rendered into the prompt (the orchestrator fetches a
/// slightly larger window; only the tail is shown to the model).
const MEMORY_WINDOW: usize = 12;
/// Upper bound on the HTML excerpt forwarded from the task context.
const HTML_EXCERPT_LIMIT: usize = 1500;

pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn system_prompt(&self) -> &'static str {
        "You are webpilot's browsing strategist. At each step, decide the single \
         next action that moves the task toward its goal, using only the \
         registered tools, and respond with exactly one JSON object matching the \
         output contract. Finish the task as soon as the goal is met or clearly \
         unreachable."
    }

    pub fn build_user_prompt(&self, input: &PlanInput<'_>) -> String {
        let mut sections = Vec::new();

        sections.push(format!("Goal: {}", input.task.goal.trim()));

        if let Some(context) = input.task.context.as_ref() {
            let mut lines = Vec::new();
            if let Some(url) = context.url.as_deref() {
                lines.push(format!("Current URL: {url}"));
            }
            if let Some(title) = context.title.as_deref() {
                lines.push(format!("Page title: {title}"));
            }
            if let Some(description) = context.description.as_deref() {
                lines.push(format!("Page description: {description}"));
            }
            if let Some(html) = context.html.as_deref() {
                lines.push(format!("HTML excerpt:\n{}", truncate(html, HTML_EXCERPT_LIMIT)));
            }
            if !lines.is_empty() {
                sections.push(format!("Page context:\n{}", lines.join("\n")));
            }
        }

        sections.push(format!(
            "Steps taken: {} of a budget of {}.",
            input.step_count, input.policy.max_steps
        ));

        if !input.recent_memory.is_empty() {
            let start = input.recent_memory.len().saturating_sub(MEMORY_WINDOW);
            let lines = input.recent_memory[start..]
                .iter()
                .map(|entry| {
                    format!(
                        "- [{}] {}: {}",
                        entry.timestamp.to_rfc3339(),
                        entry.kind.label(),
                        entry.content
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("Recent memory:\n{lines}"));
        }

        let mut tool_blocks = Vec::new();
        for tool in input.tools {
            let mut lines = vec![format!("• {}: {}", tool.name, tool.description)];
            let required = tool.required_params();
            if !required.is_empty() {
                lines.push(format!("  Required params: {}", required.join(", ")));
            }
            for note in &tool.safety_notes {
                lines.push(format!("  Safety: {note}"));
            }
            tool_blocks.push(lines.join("\n"));
        }
        sections.push(format!("Available tools:\n{}", tool_blocks.join("\n")));

        sections.push(format!(
            "Safety policy:\n\
             - Never navigate to URLs starting with: {}\n\
             - Never click or type into elements matching: {}\n\
             - Wait durations are capped at {} ms.",
            input.policy.blocked_origins.join(", "),
            input.policy.restricted_selectors.join(", "),
            input.policy.max_wait_ms
        ));

        sections.push(
            "Respond with a single JSON object: \
             {\"thought\": string, \
             \"action\"?: {\"type\": string, \"params\": object}, \
             \"finish\"?: {\"status\": \"success\" | \"failed\", \"summary\": string}, \
             \"caution\"?: string}. \
             Provide exactly one of \"action\" or \"finish\". No other text."
                .to_string(),
        );

        sections.join("\n\n")
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
