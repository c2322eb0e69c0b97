//! Agents for the customer-service assistant.
//!
//! Every agent implements [`Agent`]: a uniform `process` entry point that
//! wraps the variant-specific `handle` with counters, cancellation and a
//! friendly error fallback. The orchestrator owns one instance per
//! [`AgentKind`]; agents reference each other only weakly.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator → WorkflowEngine
//!   ├── MultimodalAgent (attachments)
//!   ├── KnowledgeAgent  → RetrievalPipeline
//!   ├── ToolAgent       → ToolRegistry
//!   └── ChatAgent       (terminal step: routes, chats, streams)
//! ```
//!
//! Chat completion and embeddings go through the pluggable
//! [`LlmProvider`] abstraction backed by OpenAI-compatible APIs.

pub mod chat;
pub mod client;
pub mod config;
pub mod kind;
pub mod knowledge;
pub mod message;
pub mod multimodal;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reply;
pub mod stats;
pub mod tool_agent;
pub mod traits;

// Re-export key types
pub use chat::{ChatAgent, ChatIntent};
pub use client::{ProviderHandles, create_provider};
pub use config::{AgentConfig, RetrievalConfig};
pub use kind::AgentKind;
pub use knowledge::KnowledgeAgent;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use multimodal::MultimodalAgent;
pub use prompt::PromptSet;
pub use provider::{LlmProvider, TextStream};
pub use reply::Reply;
pub use stats::{AgentStats, AgentStatus};
pub use tool_agent::{ToolAgent, ToolNeed};
pub use traits::Agent;
