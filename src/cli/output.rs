//! Output formatting for CLI commands.

#![allow(clippy::uninlined_format_args)]

use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::agent::AgentStatus;
use crate::orchestrator::HealthReport;
use crate::workflow::WorkflowDefinition;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON with a trailing newline.
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        let mut json = serde_json::to_string_pretty(value).unwrap_or_default();
        json.push('\n');
        json
    }
}

/// Reply of the `chat` command in JSON mode.
#[derive(Debug, Serialize)]
pub struct ChatReply<'a> {
    /// Workflow used.
    pub workflow: &'a str,
    /// Final answer.
    pub response: &'a str,
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Formats agent status snapshots.
pub fn format_status(statuses: &[AgentStatus], format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return format.to_json(statuses);
    }
    if statuses.is_empty() {
        return "No agents registered.\n".to_string();
    }
    let mut output = String::new();
    for status in statuses {
        let _ = writeln!(
            output,
            "{:<16} {:<11} messages: {:<5} errors: {:<5} error rate: {:<7} {}",
            status.name,
            status.kind,
            status.message_count,
            status.error_count,
            percent(status.error_rate),
            if status.is_healthy { "healthy" } else { "unhealthy" }
        );
    }
    output
}

/// Formats the health report.
pub fn format_health(report: &HealthReport, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return format.to_json(report);
    }
    let mut output = String::new();
    let _ = writeln!(output, "Status: {}", report.manager_status);
    let _ = writeln!(
        output,
        "Requests: {} total, {} successful, {} failed ({})",
        report.total_requests,
        report.successful_requests,
        report.failed_requests,
        percent(report.success_rate)
    );
    let _ = writeln!(output, "Agents:");
    for (kind, health) in &report.agents {
        let _ = writeln!(
            output,
            "  {:<11} {}",
            kind,
            if health.healthy { "ok" } else { "failing" }
        );
    }
    let _ = writeln!(output, "Workflows:");
    for (name, steps) in &report.workflows {
        let _ = writeln!(output, "  {name}");
        for step in steps {
            let _ = writeln!(
                output,
                "    {} {:<11} executed: {} ok: {} failed: {}",
                step.priority, step.kind, step.execution_count, step.success_count, step.error_count
            );
        }
    }
    output
}

/// Formats the workflow catalog.
pub fn format_workflows(workflows: &[&WorkflowDefinition], format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return format.to_json(workflows);
    }
    let mut output = String::new();
    for workflow in workflows {
        let _ = writeln!(output, "{}: {}", workflow.name, workflow.description);
        for step in workflow.sorted_steps() {
            let condition = step
                .condition
                .and_then(|c| serde_json::to_value(c).ok())
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| "always".to_string());
            let _ = writeln!(output, "  {}. {:<11} when {}", step.priority, step.kind, condition);
        }
    }
    output
}
