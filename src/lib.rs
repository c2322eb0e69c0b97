//! # assistflow
//!
//! Multi-agent workflow orchestration for customer-service assistants.
//!
//! A message is routed through a declarative workflow of specialist agents:
//! multimodal analysis of attachments, knowledge-base retrieval, tool
//! execution, and finally conversational chat. Chat results short-circuit
//! the workflow; otherwise the specialists' results are composed into one
//! answer. Responses can be returned whole or streamed.
//!
//! Every external service (chat completion, embeddings, vector search,
//! reranking) sits behind a trait and is optional; without them each agent
//! falls back to deterministic behavior.
//!
//! ```no_run
//! use assistflow::{AgentConfig, Orchestrator, RequestContext};
//!
//! # async fn demo() -> assistflow::Result<()> {
//! let orchestrator = Orchestrator::builder(AgentConfig::from_env()?).build()?;
//! let reply = orchestrator
//!     .process_message("现在几点了？", &RequestContext::default(), None, None)
//!     .await;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod retrieval;
pub mod tools;
pub mod workflow;

pub use agent::{
    Agent, AgentConfig, AgentKind, AgentStatus, LlmProvider, PromptSet, Reply, TextStream,
};
pub use context::{ModelOverrides, RequestContext};
pub use error::{AgentError, Result};
pub use orchestrator::{HealthReport, Orchestrator, OrchestratorBuilder};
pub use retrieval::{Embedder, Reranker, RetrievalPipeline, VectorStore};
pub use tools::{Tool, ToolRegistry};
pub use workflow::{Condition, WorkflowDefinition, WorkflowEngine, WorkflowStep};
