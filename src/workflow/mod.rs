//! Declarative workflows and the engine that runs them.
//!
//! A [`WorkflowDefinition`] is data: a named list of [`WorkflowStep`]s, each
//! naming an [`AgentKind`], a priority and an optional [`Condition`]. The
//! [`WorkflowEngine`] sorts steps by priority, evaluates conditions against
//! the request context and dispatches to the agent registered for each kind.

pub mod catalog;
pub mod engine;
pub mod stream;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;
use crate::context::RequestContext;

pub use catalog::{
    KNOWLEDGE_SEARCH, MULTIMODAL_ANALYSIS, STANDARD_CHAT, TOOL_EXECUTION, default_workflows,
};
pub use engine::{WorkflowEngine, WorkflowRun};
pub use stream::{ChunkedText, simulated_stream};

/// Named predicates over the request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Always qualifies.
    Always,
    /// Images or files are attached.
    HasMultimodal,
    /// Knowledge search is enabled (default `true`).
    NeedsKnowledge,
    /// Tool calls are enabled (default `true`).
    NeedsTools,
}

impl Condition {
    /// Evaluates the predicate.
    #[must_use]
    pub fn evaluate(self, ctx: &RequestContext) -> bool {
        match self {
            Self::Always => true,
            Self::HasMultimodal => ctx.has_multimodal(),
            Self::NeedsKnowledge => ctx.enable_knowledge,
            Self::NeedsTools => ctx.enable_tools,
        }
    }
}

/// Run counters of one step, shared by concurrent requests.
#[derive(Debug, Default)]
pub struct StepCounters {
    execution_count: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
}

impl StepCounters {
    pub(crate) fn record_execution(&self) {
        self.execution_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Times the step was reached.
    #[must_use]
    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }

    /// Times the step's agent succeeded.
    #[must_use]
    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    /// Times the step failed.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

impl Clone for StepCounters {
    fn clone(&self) -> Self {
        Self {
            execution_count: AtomicU64::new(self.execution_count()),
            success_count: AtomicU64::new(self.success_count()),
            error_count: AtomicU64::new(self.error_count()),
        }
    }
}

/// One conditional agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Agent kind to dispatch to.
    pub kind: AgentKind,
    /// Lower runs earlier; ties keep declaration order.
    pub priority: i32,
    /// Gate; `None` always qualifies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Declared parallelism hint. Steps still run in priority order.
    #[serde(default)]
    pub parallel: bool,
    /// Run counters.
    #[serde(skip)]
    pub counters: StepCounters,
}

impl WorkflowStep {
    /// An unconditional step.
    #[must_use]
    pub fn new(kind: AgentKind, priority: i32) -> Self {
        Self {
            kind,
            priority,
            condition: None,
            parallel: false,
            counters: StepCounters::default(),
        }
    }

    /// Adds a condition.
    #[must_use]
    pub const fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Returns `true` if the step should run for `ctx`.
    #[must_use]
    pub fn qualifies(&self, ctx: &RequestContext) -> bool {
        self.condition.is_none_or(|c| c.evaluate(ctx))
    }

    /// Counter snapshot.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> StepStats {
        let executions = self.counters.execution_count();
        let successes = self.counters.success_count();
        StepStats {
            kind: self.kind,
            priority: self.priority,
            execution_count: executions,
            success_count: successes,
            error_count: self.counters.error_count(),
            success_rate: successes as f64 / executions.max(1) as f64,
        }
    }
}

/// Read-only statistics of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepStats {
    /// Agent kind.
    pub kind: AgentKind,
    /// Step priority.
    pub priority: i32,
    /// Times reached.
    pub execution_count: u64,
    /// Times succeeded.
    pub success_count: u64,
    /// Times failed.
    pub error_count: u64,
    /// `success_count / max(execution_count, 1)`.
    pub success_rate: f64,
}

/// A named set of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name.
    pub name: String,
    /// What the workflow is for.
    #[serde(default)]
    pub description: String,
    /// Steps in declaration order.
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    /// Creates a workflow.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
        }
    }

    /// Steps in execution order (stable by priority).
    #[must_use]
    pub fn sorted_steps(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.priority);
        steps
    }

    /// Statistics of every step, in execution order.
    #[must_use]
    pub fn stats(&self) -> Vec<StepStats> {
        self.sorted_steps().into_iter().map(WorkflowStep::stats).collect()
    }
}
