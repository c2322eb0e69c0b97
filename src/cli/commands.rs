//! CLI command implementations.
//!
//! Each command builds an [`Orchestrator`] from the environment and the
//! global flags, runs, and writes its result to the given writer.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentConfig, PromptSet, ProviderHandles, create_provider};
use crate::cli::output::{ChatReply, OutputFormat, format_health, format_status, format_workflows};
use crate::cli::parser::{ChatArgs, Cli, Commands};
use crate::context::{ModelOverrides, RequestContext};
use crate::orchestrator::Orchestrator;
use crate::retrieval::{InMemoryVectorStore, KeywordReranker, KnowledgeDocument};
use crate::workflow::WorkflowDefinition;

/// Executes the parsed CLI command.
///
/// # Errors
///
/// Returns an error if configuration is invalid, a knowledge or prompt file
/// cannot be read or written, or output cannot be written.
pub async fn execute<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Chat(args) => cmd_chat(cli, args, format, out).await,
        Commands::Status { agent } => {
            let orchestrator = build_orchestrator(cli, None).await?;
            let statuses = orchestrator.get_agent_status(*agent);
            out.write_all(format_status(&statuses, format).as_bytes())?;
            Ok(())
        }
        Commands::Health => {
            let orchestrator = build_orchestrator(cli, None).await?;
            let report = orchestrator.health_check().await;
            out.write_all(format_health(&report, format).as_bytes())?;
            Ok(())
        }
        Commands::Workflows => {
            let orchestrator = build_orchestrator(cli, None).await?;
            let workflows: Vec<&WorkflowDefinition> = orchestrator.workflows().collect();
            out.write_all(format_workflows(&workflows, format).as_bytes())?;
            Ok(())
        }
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format, out),
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut builder = AgentConfig::builder().from_env();
    if let Some(dir) = &cli.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    builder.build().context("agent configuration error")
}

/// Creates the provider when an API key is configured.
///
/// A missing key or a provider that cannot be created leaves every agent on
/// its offline fallback.
fn load_providers(config: &AgentConfig) -> Option<ProviderHandles> {
    if config.api_key.is_none() {
        debug!("no API key configured, running on fallbacks");
        return None;
    }
    match create_provider(config) {
        Ok(handles) => Some(handles),
        Err(e) => {
            warn!(provider = %config.provider, error = %e, "provider unavailable, running on fallbacks");
            None
        }
    }
}

fn read_knowledge_file(path: &Path) -> Result<Vec<KnowledgeDocument>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read knowledge file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("knowledge file {} is not a JSON array of documents", path.display()))
}

async fn build_orchestrator(cli: &Cli, chat: Option<&ChatArgs>) -> Result<Orchestrator> {
    let config = load_config(cli)?;
    let providers = load_providers(&config);
    let mut builder = Orchestrator::builder(config.clone());

    if let Some(handles) = &providers {
        builder = builder
            .llm(Arc::clone(&handles.llm))
            .embedder(Arc::clone(&handles.embedder));
    }

    if let Some(args) = chat {
        if let Some(path) = &args.knowledge_file {
            let documents = read_knowledge_file(path)?;
            match &providers {
                Some(handles) => {
                    let store = InMemoryVectorStore::new();
                    let default_collection = config
                        .retrieval
                        .collections
                        .first()
                        .map_or("knowledge_base", String::as_str);
                    let indexed = store
                        .index_documents(handles.embedder.as_ref(), default_collection, documents)
                        .await
                        .context("failed to index knowledge file")?;
                    info!(documents = indexed, "knowledge file indexed");
                    builder = builder.vector_store(Arc::new(store));
                }
                None => {
                    warn!(
                        documents = documents.len(),
                        "knowledge file ignored: indexing needs an embedding provider"
                    );
                }
            }
        }
        if args.rerank {
            builder = builder.reranker(Arc::new(KeywordReranker));
        }
    }

    builder.build().context("failed to build orchestrator")
}

fn request_context(args: &ChatArgs) -> RequestContext {
    RequestContext {
        user_id: args.user_id.clone(),
        tenant_id: args.tenant_id.clone(),
        images: args.images.clone(),
        files: args.files.clone(),
        enable_knowledge: !args.no_knowledge,
        enable_tools: !args.no_tools,
        ..RequestContext::default()
    }
}

fn model_overrides(args: &ChatArgs) -> Option<ModelOverrides> {
    (args.model.is_some() || args.temperature.is_some()).then(|| ModelOverrides {
        model: args.model.clone(),
        temperature: args.temperature,
        max_tokens: None,
    })
}

/// Cancels the returned token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

async fn cmd_chat<W: Write>(
    cli: &Cli,
    args: &ChatArgs,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let orchestrator = build_orchestrator(cli, Some(args)).await?;
    let ctx = request_context(args);
    let overrides = model_overrides(args);
    let cancel = cancel_on_interrupt();

    if args.stream {
        let mut stream = orchestrator.stream_chat(
            &args.message,
            &ctx,
            overrides,
            Some(&args.workflow),
            cancel.clone(),
        );
        while let Some(item) = stream.next().await {
            match item {
                Ok(unit) => {
                    match format {
                        OutputFormat::Text => write!(out, "{unit}")?,
                        OutputFormat::Json => {
                            writeln!(out, "{}", serde_json::json!({ "delta": unit }))?;
                        }
                    }
                    out.flush()?;
                }
                Err(e) => warn!(error = %e, "stream item dropped"),
            }
        }
        if format == OutputFormat::Text {
            writeln!(out)?;
        }
    } else {
        let response = orchestrator
            .process_message_with_cancel(&args.message, &ctx, overrides, Some(&args.workflow), &cancel)
            .await;
        match format {
            OutputFormat::Text => writeln!(out, "{response}")?,
            OutputFormat::Json => out.write_all(
                format
                    .to_json(&ChatReply {
                        workflow: &args.workflow,
                        response: &response,
                    })
                    .as_bytes(),
            )?,
        }
    }
    cancel.cancel();
    Ok(())
}

fn cmd_init_prompts<W: Write>(dir: Option<&Path>, format: OutputFormat, out: &mut W) -> Result<()> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .context("could not determine home directory for default prompt path")?;

    let written = PromptSet::write_defaults(&target_dir)
        .with_context(|| format!("failed to write prompt templates to {}", target_dir.display()))?;

    let output = match format {
        OutputFormat::Text if written.is_empty() => format!(
            "All prompt templates already exist in: {}\n",
            target_dir.display()
        ),
        OutputFormat::Text => {
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str("  ");
                output.push_str(
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown"),
                );
                output.push('\n');
            }
            output
        }
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "directory": target_dir,
            "written": written,
        })),
    };
    out.write_all(output.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_request_context_from_args() {
        let cli = Cli::try_parse_from([
            "assistflow",
            "chat",
            "hi",
            "--user-id",
            "u1",
            "--file",
            "a.pdf",
            "--no-knowledge",
            "--temperature",
            "0.2",
        ])
        .unwrap_or_else(|_| unreachable!());
        let Commands::Chat(args) = &cli.command else {
            unreachable!()
        };
        let ctx = request_context(args);
        assert_eq!(ctx.user_id.as_deref(), Some("u1"));
        assert!(ctx.has_multimodal());
        assert!(!ctx.enable_knowledge);
        assert!(ctx.enable_tools);
        let overrides = model_overrides(args).unwrap_or_default();
        assert_eq!(overrides.temperature, Some(0.2));
        assert!(overrides.model.is_none());
    }

    #[test]
    fn test_init_prompts_writes_once() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let mut out = Vec::new();
        cmd_init_prompts(Some(dir.path()), OutputFormat::Text, &mut out)
            .unwrap_or_else(|_| unreachable!());
        let text = String::from_utf8(out).unwrap_or_default();
        assert!(text.starts_with("Wrote 5 prompt template(s)"));

        let mut out = Vec::new();
        cmd_init_prompts(Some(dir.path()), OutputFormat::Text, &mut out)
            .unwrap_or_else(|_| unreachable!());
        let text = String::from_utf8(out).unwrap_or_default();
        assert!(text.starts_with("All prompt templates already exist"));
    }

    #[test]
    fn test_read_knowledge_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("kb.json");
        std::fs::write(
            &path,
            r#"[{"id": "d1", "text": "退货政策：七天无理由退货", "source": "faq"}]"#,
        )
        .unwrap_or_else(|_| unreachable!());
        let docs = read_knowledge_file(&path).unwrap_or_default();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source.as_deref(), Some("faq"));

        std::fs::write(&path, "not json").unwrap_or_else(|_| unreachable!());
        assert!(read_knowledge_file(&path).is_err());
    }
}
