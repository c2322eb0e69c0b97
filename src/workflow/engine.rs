//! Batch and streaming workflow execution.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::stream::ChunkedText;
use super::{WorkflowDefinition, WorkflowStep};
use crate::agent::{Agent, AgentKind, Reply, TextStream};
use crate::context::RequestContext;
use crate::error::AgentError;

/// Kinds whose results make up the composite answer, in section order.
const COMPOSITE_ORDER: [AgentKind; 3] = [AgentKind::Multimodal, AgentKind::Knowledge, AgentKind::Tool];

/// Reply when no step produced anything.
pub const NOTHING_PRODUCED: &str = "抱歉，暂时无法处理您的请求，请稍后再试。";

/// Buffered stream units between the engine task and the consumer.
const STREAM_BUFFER: usize = 64;

/// Section heading for a kind in the composite answer.
#[must_use]
pub const fn section_label(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Multimodal => "多模态分析",
        AgentKind::Knowledge => "知识库检索",
        AgentKind::Tool => "工具执行",
        AgentKind::Chat => "对话",
    }
}

/// Inline text for a failed step.
#[must_use]
pub fn failure_fragment(error: &AgentError) -> String {
    match error {
        AgentError::AgentUnavailable { kind } => fragment(&format!("没有可用的 {kind} 智能体")),
        AgentError::EmptyResponse { .. } => fragment("智能体未返回任何内容"),
        other => fragment(other.category()),
    }
}

fn fragment(reason: &str) -> String {
    format!("执行失败: {reason}")
}

/// Message streamed when the pipeline itself fails.
fn pipeline_error_message(error: &AgentError) -> String {
    if error.is_cancelled() {
        "请求已取消。".to_string()
    } else {
        format!("抱歉，处理您的请求时出现错误（{}），请稍后再试。", error.category())
    }
}

/// Outcome of one batch execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowRun {
    /// Final response text.
    pub response: String,
    /// Results of steps that succeeded, by kind.
    pub results: BTreeMap<AgentKind, String>,
    /// Text of steps that succeeded without a result, by kind.
    pub notices: BTreeMap<AgentKind, String>,
    /// Failure fragments of steps that failed, by kind.
    pub failures: BTreeMap<AgentKind, String>,
    /// Steps whose condition held, in execution order.
    pub executed: Vec<AgentKind>,
    /// Whether the chat step produced the response.
    pub short_circuited: bool,
}

impl WorkflowRun {
    /// Returns `true` if at least one step succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.results.is_empty() || !self.notices.is_empty()
    }

    /// Records one step's outcome. Returns the reply that ends the run when
    /// the chat step succeeded.
    fn absorb(
        &mut self,
        workflow: &str,
        step: &WorkflowStep,
        outcome: StepOutcome,
        step_ctx: &mut RequestContext,
    ) -> Option<String> {
        step_ctx.consulted.insert(step.kind);
        match outcome {
            StepOutcome::Failed(fragment) => {
                step.counters.record_error();
                warn!(workflow, kind = %step.kind, reason = %fragment, "step failed");
                self.failures.insert(step.kind, fragment);
                None
            }
            StepOutcome::Answer(text) | StepOutcome::Notice(text) if step.kind == AgentKind::Chat => {
                step.counters.record_success();
                self.results.insert(step.kind, text.clone());
                self.short_circuited = true;
                Some(text)
            }
            StepOutcome::Answer(text) => {
                step.counters.record_success();
                debug!(workflow, kind = %step.kind, "step produced a result");
                step_ctx.upstream.insert(step.kind, text.clone());
                self.results.insert(step.kind, text);
                None
            }
            StepOutcome::Notice(text) => {
                step.counters.record_success();
                debug!(workflow, kind = %step.kind, "step had nothing to add");
                self.notices.insert(step.kind, text);
                None
            }
        }
    }

    fn compose(&mut self) {
        let sections: Vec<String> = COMPOSITE_ORDER
            .iter()
            .filter_map(|kind| {
                let body = self
                    .results
                    .get(kind)
                    .or_else(|| self.notices.get(kind))
                    .or_else(|| self.failures.get(kind))?;
                Some(format!("【{}】\n{}", section_label(*kind), body))
            })
            .collect();

        self.response = if sections.is_empty() {
            self.failures
                .get(&AgentKind::Chat)
                .cloned()
                .unwrap_or_else(|| NOTHING_PRODUCED.to_string())
        } else {
            sections.join("\n\n")
        };
    }
}

/// What one qualifying step produced.
#[derive(Debug)]
enum StepOutcome {
    /// A result later steps may use.
    Answer(String),
    /// User-legible text without a result.
    Notice(String),
    /// The step failed; carries its failure fragment.
    Failed(String),
}

/// Dispatches workflow steps to registered agents.
#[derive(Clone)]
pub struct WorkflowEngine {
    agents: BTreeMap<AgentKind, Arc<dyn Agent>>,
    stream_delay: Duration,
}

impl WorkflowEngine {
    /// Creates an engine with no agents.
    #[must_use]
    pub const fn new(stream_delay: Duration) -> Self {
        Self {
            agents: BTreeMap::new(),
            stream_delay,
        }
    }

    /// Registers the agent for its kind, replacing any previous one.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.kind(), agent);
    }

    /// Agent registered for `kind`.
    #[must_use]
    pub fn agent(&self, kind: AgentKind) -> Option<&Arc<dyn Agent>> {
        self.agents.get(&kind)
    }

    /// Registered agents, by kind.
    pub fn agents(&self) -> impl Iterator<Item = &Arc<dyn Agent>> {
        self.agents.values()
    }

    /// Delay between simulated stream units.
    #[must_use]
    pub const fn stream_delay(&self) -> Duration {
        self.stream_delay
    }

    /// Runs one step's agent.
    ///
    /// A missing agent, an apology from a failed `handle` and an empty
    /// reply all count as failures.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] only.
    async fn run_step(
        &self,
        step: &WorkflowStep,
        message: &str,
        ctx: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, AgentError> {
        let Some(agent) = self.agent(step.kind) else {
            return Ok(StepOutcome::Failed(failure_fragment(&AgentError::AgentUnavailable {
                kind: step.kind.to_string(),
            })));
        };
        let outcome = match agent.process(message, ctx, cancel).await? {
            Reply::Apology { category, .. } => StepOutcome::Failed(fragment(category)),
            reply if reply.text().trim().is_empty() => {
                StepOutcome::Failed(failure_fragment(&AgentError::EmptyResponse {
                    agent: agent.name().to_string(),
                }))
            }
            Reply::Answer(text) => StepOutcome::Answer(text),
            Reply::Notice(text) => StepOutcome::Notice(text),
        };
        Ok(outcome)
    }

    /// Runs a workflow to completion.
    ///
    /// Steps run in priority order. The first successful chat step ends the
    /// run with its result; otherwise non-chat results are composed into
    /// labeled sections (multimodal, knowledge, tool).
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if the request is cancelled. Step
    /// failures never abort the run.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        message: &str,
        ctx: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<WorkflowRun, AgentError> {
        let mut step_ctx = ctx.clone();
        step_ctx.upstream.clear();
        step_ctx.consulted.clear();
        let mut run = WorkflowRun::default();

        for step in workflow.sorted_steps() {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            step.counters.record_execution();
            if !step.qualifies(&step_ctx) {
                debug!(workflow = %workflow.name, kind = %step.kind, "step skipped");
                continue;
            }
            run.executed.push(step.kind);

            let outcome = match self.run_step(step, message, &step_ctx, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    step.counters.record_error();
                    return Err(e);
                }
            };
            if let Some(reply) = run.absorb(&workflow.name, step, outcome, &mut step_ctx) {
                run.response = reply;
                return Ok(run);
            }
        }

        run.compose();
        Ok(run)
    }

    /// Runs a workflow and streams the response.
    ///
    /// Pre-chat steps run exactly as in [`Self::execute`]. The chat step
    /// streams natively when its agent supports it; every other response is
    /// streamed one unit at a time. Failures are streamed as text; the
    /// stream never yields an error item.
    ///
    /// Dropping the stream cancels the remaining steps.
    pub fn execute_stream(
        &self,
        workflow: Arc<WorkflowDefinition>,
        message: String,
        ctx: RequestContext,
        cancel: CancellationToken,
    ) -> TextStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let engine = self.clone();
        let work = cancel.child_token();

        tokio::spawn(async move {
            let watcher = tx.clone();
            let sink = UnitSink {
                tx,
                delay: engine.stream_delay,
            };
            let finished = tokio::select! {
                () = watcher.closed() => None,
                result = engine.stream_steps(&workflow, &message, &ctx, &work, &sink) => Some(result),
            };
            match finished {
                None => {
                    debug!(workflow = %workflow.name, "stream consumer dropped, cancelling workflow");
                    work.cancel();
                }
                Some(Err(e)) => {
                    warn!(workflow = %workflow.name, error = %e, "streaming workflow failed");
                    sink.send_text(&pipeline_error_message(&e)).await;
                }
                Some(Ok(())) => {}
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn stream_steps(
        &self,
        workflow: &WorkflowDefinition,
        message: &str,
        ctx: &RequestContext,
        cancel: &CancellationToken,
        sink: &UnitSink,
    ) -> Result<(), AgentError> {
        let mut step_ctx = ctx.clone();
        step_ctx.upstream.clear();
        step_ctx.consulted.clear();
        let mut run = WorkflowRun::default();

        for step in workflow.sorted_steps() {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            step.counters.record_execution();
            if !step.qualifies(&step_ctx) {
                debug!(workflow = %workflow.name, kind = %step.kind, "step skipped");
                continue;
            }
            run.executed.push(step.kind);

            if step.kind == AgentKind::Chat
                && let Some(agent) = self.agent(AgentKind::Chat)
                && let Some(Ok(native)) = agent.stream(message, &step_ctx, cancel).await
            {
                info!(workflow = %workflow.name, "streaming chat natively");
                return match sink.forward(native, cancel).await {
                    Ok(()) => {
                        step.counters.record_success();
                        Ok(())
                    }
                    Err(e) => {
                        step.counters.record_error();
                        if e.is_cancelled() {
                            return Err(e);
                        }
                        agent.stats().record_error();
                        warn!(workflow = %workflow.name, error = %e, "native stream broke off");
                        sink.send_text(&format!("\n{}", failure_fragment(&e))).await;
                        Ok(())
                    }
                };
            }

            let outcome = match self.run_step(step, message, &step_ctx, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    step.counters.record_error();
                    return Err(e);
                }
            };
            if let Some(reply) = run.absorb(&workflow.name, step, outcome, &mut step_ctx) {
                sink.send_text(&reply).await;
                return Ok(());
            }
        }

        run.compose();
        sink.send_text(&run.response).await;
        Ok(())
    }
}

/// Sending half of a response stream.
struct UnitSink {
    tx: mpsc::Sender<Result<String, AgentError>>,
    delay: Duration,
}

impl UnitSink {
    /// Streams `text` one unit at a time. Stops quietly if the consumer left.
    async fn send_text(&self, text: &str) {
        let mut units = Box::pin(ChunkedText::new(text, self.delay).stream());
        while let Some(unit) = units.next().await {
            if self.tx.send(Ok(unit)).await.is_err() {
                debug!("stream consumer dropped");
                return;
            }
        }
    }

    /// Forwards a native stream, ending on cancellation or the first error.
    async fn forward(&self, mut native: TextStream, cancel: &CancellationToken) -> Result<(), AgentError> {
        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return Err(AgentError::Cancelled),
                chunk = native.next() => chunk,
            };
            match chunk {
                None => return Ok(()),
                Some(Ok(text)) if text.is_empty() => {}
                Some(Ok(text)) => {
                    if self.tx.send(Ok(text)).await.is_err() {
                        debug!("stream consumer dropped");
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .field("stream_delay", &self.stream_delay)
            .finish()
    }
}
