//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::AgentKind;
use crate::workflow::STANDARD_CHAT;

/// assistflow: multi-agent customer-service assistant.
///
/// Routes each message through a workflow of specialist agents (attachment
/// analysis, knowledge retrieval, tool execution) before the chat agent
/// replies. Runs on deterministic fallbacks when no API key is configured.
#[derive(Parser, Debug)]
#[command(name = "assistflow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging on stderr).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Directory with prompt template overrides.
    #[arg(long, env = "ASSISTFLOW_PROMPT_DIR", global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message through a workflow.
    #[command(after_help = r#"Examples:
  assistflow chat "你好"                                   # Standard workflow
  assistflow chat "计算 12*(3+4)" --workflow tool_execution
  assistflow chat "退货政策是什么" --knowledge-file faq.json --rerank
  assistflow chat "看看这张图" --image receipt.png --stream
  assistflow --format json chat "现在几点" | jq .response
"#)]
    Chat(ChatArgs),

    /// Show agent status counters.
    Status {
        /// Only this agent kind (chat, knowledge, tool, multimodal).
        #[arg(short, long, value_parser = parse_agent_kind)]
        agent: Option<AgentKind>,
    },

    /// Run agent health checks and print the health report.
    Health,

    /// List the registered workflows and their steps.
    Workflows,

    /// Write the default prompt templates for editing.
    ///
    /// Existing files are never overwritten.
    InitPrompts {
        /// Target directory (default: ~/.config/assistflow/prompts).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

/// Arguments of the `chat` command.
#[derive(clap::Args, Debug, Clone)]
pub struct ChatArgs {
    /// The message to send.
    pub message: String,

    /// Workflow name.
    #[arg(short, long, default_value = STANDARD_CHAT)]
    pub workflow: String,

    /// Stream the reply unit by unit.
    #[arg(short, long)]
    pub stream: bool,

    /// Caller identity; scopes history and knowledge search.
    #[arg(short, long)]
    pub user_id: Option<String>,

    /// Tenant identity; scopes knowledge search.
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Attached image reference (repeatable).
    #[arg(long = "image")]
    pub images: Vec<String>,

    /// Attached file reference (repeatable).
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Skip the knowledge step.
    #[arg(long)]
    pub no_knowledge: bool,

    /// Skip the tool step.
    #[arg(long)]
    pub no_tools: bool,

    /// JSON file of documents to index before answering.
    #[arg(short, long)]
    pub knowledge_file: Option<PathBuf>,

    /// Rerank retrieved passages by keyword coverage.
    #[arg(long)]
    pub rerank: bool,

    /// Chat model override.
    #[arg(long)]
    pub model: Option<String>,

    /// Sampling temperature override.
    #[arg(long)]
    pub temperature: Option<f32>,
}

fn parse_agent_kind(s: &str) -> Result<AgentKind, String> {
    AgentKind::parse(s).ok_or_else(|| {
        format!("unknown agent kind '{s}' (expected chat, knowledge, tool or multimodal)")
    })
}
