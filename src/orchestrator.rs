//! Orchestrator: the caller-facing surface of the agent system.
//!
//! Owns one agent per kind and the workflow catalog, resolves the workflow
//! for each request, and keeps process-wide request counters.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{
    Agent, AgentConfig, AgentKind, AgentStatus, ChatAgent, KnowledgeAgent, LlmProvider,
    MultimodalAgent, PromptSet, TextStream, ToolAgent,
};
use crate::context::{ModelOverrides, RequestContext};
use crate::error::AgentError;
use crate::retrieval::{Embedder, Reranker, RetrievalPipeline, VectorStore};
use crate::tools::ToolRegistry;
use crate::workflow::{STANDARD_CHAT, StepStats, WorkflowDefinition, WorkflowEngine, default_workflows};

/// Reply to an empty message.
pub const EMPTY_MESSAGE_REPLY: &str = "请输入您想咨询的问题。";
/// Reply to a cancelled request.
pub const CANCELLED_REPLY: &str = "请求已取消。";
/// Last-resort apology.
pub const GENERIC_APOLOGY: &str = "抱歉，系统暂时无法处理您的请求，请稍后再试。";

/// Process-wide request counters.
#[derive(Debug, Default)]
struct RequestCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
}

impl RequestCounters {
    fn begin(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, success: bool) {
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Settles one streamed request in the counters when dropped.
///
/// A stream dropped before its end counts as failed.
struct StreamSettlement {
    counters: Arc<RequestCounters>,
    cancel: CancellationToken,
    completed: bool,
}

impl Drop for StreamSettlement {
    fn drop(&mut self) {
        self.counters
            .finish(self.completed && !self.cancel.is_cancelled());
    }
}

/// Health of one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    /// Result of the agent's health check.
    pub healthy: bool,
    /// Status snapshot.
    pub status: AgentStatus,
}

/// Output of [`Orchestrator::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `"healthy"` when every agent passes its check, else `"degraded"`.
    pub manager_status: String,
    /// Per-agent health.
    pub agents: BTreeMap<AgentKind, AgentHealth>,
    /// Per-workflow step statistics.
    pub workflows: BTreeMap<String, Vec<StepStats>>,
    /// Requests received.
    pub total_requests: u64,
    /// Requests that produced at least one step result.
    pub successful_requests: u64,
    /// Requests that produced nothing or were cancelled.
    pub failed_requests: u64,
    /// `successful_requests / max(total_requests, 1)`.
    pub success_rate: f64,
    /// Time the orchestrator was built.
    pub started_at: DateTime<Utc>,
}

/// Runs workflows against the registered agents.
pub struct Orchestrator {
    config: AgentConfig,
    engine: WorkflowEngine,
    workflows: BTreeMap<String, Arc<WorkflowDefinition>>,
    counters: Arc<RequestCounters>,
    started_at: DateTime<Utc>,
}

impl Orchestrator {
    /// Creates a builder.
    #[must_use]
    pub fn builder(config: AgentConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The workflow engine.
    #[must_use]
    pub const fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Registered workflows, by name.
    pub fn workflows(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.workflows.values().map(Arc::as_ref)
    }

    /// Looks up a workflow; unknown names fall back to `standard_chat`.
    #[must_use]
    pub fn resolve_workflow(&self, name: Option<&str>) -> Option<Arc<WorkflowDefinition>> {
        let name = name.unwrap_or(STANDARD_CHAT);
        if let Some(workflow) = self.workflows.get(name) {
            return Some(Arc::clone(workflow));
        }
        warn!(workflow = name, "unknown workflow, using {STANDARD_CHAT}");
        self.workflows.get(STANDARD_CHAT).cloned()
    }

    fn request_context(ctx: &RequestContext, overrides: Option<ModelOverrides>) -> RequestContext {
        let mut ctx = ctx.clone();
        if overrides.is_some() {
            ctx.model = overrides;
        }
        ctx
    }

    /// Processes a message through a workflow and returns the answer.
    ///
    /// Never fails: every error becomes user-facing text.
    pub async fn process_message(
        &self,
        message: &str,
        ctx: &RequestContext,
        overrides: Option<ModelOverrides>,
        workflow: Option<&str>,
    ) -> String {
        self.process_message_with_cancel(message, ctx, overrides, workflow, &CancellationToken::new())
            .await
    }

    /// [`Self::process_message`] with a caller-controlled cancellation token.
    pub async fn process_message_with_cancel(
        &self,
        message: &str,
        ctx: &RequestContext,
        overrides: Option<ModelOverrides>,
        workflow: Option<&str>,
        cancel: &CancellationToken,
    ) -> String {
        self.counters.begin();
        if message.trim().is_empty() {
            self.counters.finish(false);
            return EMPTY_MESSAGE_REPLY.to_string();
        }
        let Some(workflow) = self.resolve_workflow(workflow) else {
            self.counters.finish(false);
            return GENERIC_APOLOGY.to_string();
        };

        let ctx = Self::request_context(ctx, overrides);
        match self.engine.execute(&workflow, message, &ctx, cancel).await {
            Ok(run) => {
                let success = run.succeeded();
                self.counters.finish(success);
                info!(
                    workflow = %workflow.name,
                    steps = run.executed.len(),
                    failures = run.failures.len(),
                    short_circuited = run.short_circuited,
                    "request processed"
                );
                run.response
            }
            Err(e) if e.is_cancelled() => {
                self.counters.finish(false);
                debug!(workflow = %workflow.name, "request cancelled");
                CANCELLED_REPLY.to_string()
            }
            Err(e) => {
                self.counters.finish(false);
                warn!(workflow = %workflow.name, error = %e, "request failed");
                GENERIC_APOLOGY.to_string()
            }
        }
    }

    /// Streams the answer to a message.
    ///
    /// The stream yields text units only; failures arrive as text. Dropping
    /// it early cancels the workflow and counts the request as failed.
    pub fn stream_chat(
        &self,
        message: &str,
        ctx: &RequestContext,
        overrides: Option<ModelOverrides>,
        workflow: Option<&str>,
        cancel: CancellationToken,
    ) -> TextStream {
        self.counters.begin();
        let delay = self.engine.stream_delay();
        if message.trim().is_empty() {
            self.counters.finish(false);
            return crate::workflow::simulated_stream(EMPTY_MESSAGE_REPLY, delay);
        }
        let Some(workflow) = self.resolve_workflow(workflow) else {
            self.counters.finish(false);
            return crate::workflow::simulated_stream(GENERIC_APOLOGY, delay);
        };

        let ctx = Self::request_context(ctx, overrides);
        let inner = self
            .engine
            .execute_stream(workflow, message.to_string(), ctx, cancel.clone());

        let settlement = StreamSettlement {
            counters: Arc::clone(&self.counters),
            cancel,
            completed: false,
        };
        Box::pin(stream::unfold(
            (inner, settlement),
            |(mut inner, mut settlement)| async move {
                match inner.next().await {
                    Some(unit) => Some((unit, (inner, settlement))),
                    None => {
                        settlement.completed = true;
                        None
                    }
                }
            },
        ))
    }

    /// Status of one agent, or of all agents.
    #[must_use]
    pub fn get_agent_status(&self, kind: Option<AgentKind>) -> Vec<AgentStatus> {
        self.engine
            .agents()
            .filter(|agent| kind.is_none_or(|k| agent.kind() == k))
            .map(|agent| agent.status())
            .collect()
    }

    /// Health of the whole system.
    pub async fn health_check(&self) -> HealthReport {
        let mut agents = BTreeMap::new();
        for agent in self.engine.agents() {
            agents.insert(
                agent.kind(),
                AgentHealth {
                    healthy: agent.health_check().await,
                    status: agent.status(),
                },
            );
        }
        let all_healthy = !agents.is_empty() && agents.values().all(|a| a.healthy);

        let workflows = self
            .workflows
            .iter()
            .map(|(name, workflow)| (name.clone(), workflow.stats()))
            .collect();

        let total = self.counters.total.load(Ordering::Relaxed);
        let successful = self.counters.successful.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let success_rate = successful as f64 / total.max(1) as f64;

        HealthReport {
            manager_status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
            agents,
            workflows,
            total_requests: total,
            successful_requests: successful,
            failed_requests: self.counters.failed.load(Ordering::Relaxed),
            success_rate,
            started_at: self.started_at,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &self.engine)
            .field("workflows", &self.workflows.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Orchestrator`].
///
/// Every collaborator is optional; missing ones leave the agents on their
/// deterministic fallbacks.
pub struct OrchestratorBuilder {
    config: AgentConfig,
    prompts: Option<PromptSet>,
    llm: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn Embedder>>,
    store: Option<Arc<dyn VectorStore>>,
    reranker: Option<Arc<dyn Reranker>>,
    tools: Option<ToolRegistry>,
    agents: Vec<Arc<dyn Agent>>,
    workflows: Vec<WorkflowDefinition>,
}

impl OrchestratorBuilder {
    fn new(config: AgentConfig) -> Self {
        Self {
            config,
            prompts: None,
            llm: None,
            embedder: None,
            store: None,
            reranker: None,
            tools: None,
            agents: Vec::new(),
            workflows: Vec::new(),
        }
    }

    /// Uses these prompts instead of loading them from disk.
    #[must_use]
    pub fn prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Sets the chat completion service.
    #[must_use]
    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Sets the embedding service.
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Sets the vector store.
    #[must_use]
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the rerank service.
    #[must_use]
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Sets the tool registry (default: built-in tools).
    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Replaces the built-in agent of the same kind.
    #[must_use]
    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Adds or replaces a workflow by name.
    #[must_use]
    pub fn workflow(mut self, workflow: WorkflowDefinition) -> Self {
        self.workflows.push(workflow);
        self
    }

    /// Builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] for a workflow without a name or steps.
    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let config = self.config;
        let prompts = self
            .prompts
            .unwrap_or_else(|| PromptSet::load(config.prompt_dir.as_deref()));
        let registry = Arc::new(
            self.tools
                .unwrap_or_else(|| ToolRegistry::with_builtins(config.tool_timeout)),
        );

        let mut pipeline = RetrievalPipeline::new(config.retrieval.clone(), config.chat_model.clone())
            .with_system_prompt(prompts.knowledge.clone());
        if let Some(embedder) = self.embedder {
            pipeline = pipeline.with_embedder(embedder);
        }
        if let Some(store) = self.store {
            pipeline = pipeline.with_store(store);
        }
        if let Some(reranker) = self.reranker {
            pipeline = pipeline.with_reranker(reranker);
        }
        if let Some(llm) = self.llm.clone() {
            pipeline = pipeline.with_llm(llm);
        }

        let chat = Arc::new(ChatAgent::new(&config, prompts.chat.clone(), self.llm.clone()));
        let mut engine = WorkflowEngine::new(config.stream_delay);
        engine.register(Arc::new(MultimodalAgent::new(
            &config,
            prompts.multimodal.clone(),
            self.llm.clone(),
        )));
        engine.register(Arc::new(KnowledgeAgent::new(pipeline)));
        engine.register(Arc::new(ToolAgent::new(
            &config,
            &prompts,
            registry,
            self.llm.clone(),
        )));
        engine.register(Arc::clone(&chat) as Arc<dyn Agent>);
        for agent in self.agents {
            debug!(kind = %agent.kind(), agent = agent.name(), "custom agent registered");
            engine.register(agent);
        }

        // collaborators are wired after every override is in place
        for agent in engine.agents() {
            chat.set_collaborator(agent);
        }

        let mut workflows = BTreeMap::new();
        for workflow in default_workflows().into_iter().chain(self.workflows) {
            if workflow.name.trim().is_empty() || workflow.steps.is_empty() {
                return Err(AgentError::Config {
                    message: format!("workflow '{}' needs a name and at least one step", workflow.name),
                });
            }
            workflows.insert(workflow.name.clone(), Arc::new(workflow));
        }

        info!(
            agents = engine.agents().count(),
            workflows = workflows.len(),
            "orchestrator ready"
        );
        Ok(Orchestrator {
            config,
            engine,
            workflows,
            counters: Arc::new(RequestCounters::default()),
            started_at: Utc::now(),
        })
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("llm", &self.llm.is_some())
            .field("embedder", &self.embedder.is_some())
            .field("store", &self.store.is_some())
            .field("reranker", &self.reranker.is_some())
            .field("agents", &self.agents.len())
            .field("workflows", &self.workflows.len())
            .finish_non_exhaustive()
    }
}
