//! Multimodal agent: describes attached images and files.

use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::config::AgentConfig;
use super::message::{ChatRequest, system_message, user_message};
use super::prompt::build_multimodal_prompt;
use super::provider::LlmProvider;
use super::reply::Reply;
use super::stats::AgentStats;
use super::traits::Agent;
use super::AgentKind;
use crate::context::RequestContext;
use crate::error::AgentError;

/// Reply when the request carries no attachments.
pub const NO_ATTACHMENTS: &str = "未检测到图片或文件内容。";

/// Human label for an attachment, from its extension.
#[must_use]
pub fn attachment_label(reference: &str) -> &'static str {
    let extension = Path::new(reference)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => "图片",
        "pdf" => "PDF 文档",
        "doc" | "docx" => "Word 文档",
        "xls" | "xlsx" | "csv" => "表格",
        "txt" | "md" => "文本文件",
        "mp3" | "wav" | "m4a" => "音频",
        "mp4" | "mov" | "avi" => "视频",
        _ => "未知类型文件",
    }
}

/// Analyzes attachments; describes them deterministically without an LLM.
pub struct MultimodalAgent {
    stats: AgentStats,
    llm: Option<Arc<dyn LlmProvider>>,
    model: String,
    system_prompt: String,
}

impl MultimodalAgent {
    /// Creates a multimodal agent.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        system_prompt: impl Into<String>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            stats: AgentStats::new(),
            llm,
            model: config.chat_model.clone(),
            system_prompt: system_prompt.into(),
        }
    }

    fn describe(ctx: &RequestContext) -> String {
        let mut description = format!(
            "已收到 {} 张图片和 {} 个文件：",
            ctx.images.len(),
            ctx.files.len()
        );
        for reference in ctx.images.iter().chain(&ctx.files) {
            let _ = write!(description, "\n- {reference}（{}）", attachment_label(reference));
        }
        description
    }
}

#[async_trait]
impl Agent for MultimodalAgent {
    fn name(&self) -> &'static str {
        "multimodal_agent"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Multimodal
    }

    fn stats(&self) -> &AgentStats {
        &self.stats
    }

    async fn handle(
        &self,
        message: &str,
        ctx: &RequestContext,
        _cancel: &CancellationToken,
    ) -> Result<Reply, AgentError> {
        if !ctx.has_multimodal() {
            return Ok(Reply::notice(NO_ATTACHMENTS));
        }
        let description = Self::describe(ctx);
        let Some(llm) = self.llm.as_ref() else {
            return Ok(Reply::Answer(description));
        };

        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                system_message(&self.system_prompt),
                user_message(&build_multimodal_prompt(message, &ctx.images, &ctx.files)),
            ],
        );
        let analysis = match llm.chat(&request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => description,
            Err(e) => {
                warn!(error = %e, "attachment analysis failed, describing only");
                description
            }
        };
        Ok(Reply::Answer(analysis))
    }
}

impl std::fmt::Debug for MultimodalAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultimodalAgent")
            .field("model", &self.model)
            .field("llm", &self.llm.as_ref().map(|l| l.name()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("photo.PNG", "图片"; "uppercase image")]
    #[test_case("invoice.pdf", "PDF 文档"; "pdf")]
    #[test_case("data.xlsx", "表格"; "spreadsheet")]
    #[test_case("noext", "未知类型文件"; "no extension")]
    fn test_attachment_label(reference: &str, expected: &str) {
        assert_eq!(attachment_label(reference), expected);
    }

    #[tokio::test]
    async fn test_offline_description() {
        let agent = MultimodalAgent::new(&AgentConfig::default(), "system", None);
        let ctx = RequestContext {
            images: vec!["a.png".to_string()],
            files: vec!["b.pdf".to_string()],
            ..RequestContext::default()
        };
        let reply = agent
            .process("这是什么", &ctx, &CancellationToken::new())
            .await
            .map(Reply::into_text)
            .unwrap_or_default();
        assert!(reply.starts_with("已收到 1 张图片和 1 个文件"));
        assert!(reply.contains("a.png（图片）"));
        assert!(reply.contains("b.pdf（PDF 文档）"));
    }

    #[tokio::test]
    async fn test_no_attachments() {
        let agent = MultimodalAgent::new(&AgentConfig::default(), "system", None);
        let reply = agent
            .process("hi", &RequestContext::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(reply, Reply::notice(NO_ATTACHMENTS));
    }
}
