//! Knowledge agent: grounded answers from the retrieval pipeline.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::reply::Reply;
use super::stats::AgentStats;
use super::traits::Agent;
use super::AgentKind;
use crate::context::RequestContext;
use crate::error::AgentError;
use crate::retrieval::{RetrievalOutcome, RetrievalPipeline};

/// Answers questions from the knowledge base.
#[derive(Debug)]
pub struct KnowledgeAgent {
    stats: AgentStats,
    pipeline: RetrievalPipeline,
}

impl KnowledgeAgent {
    /// Wraps a configured pipeline.
    #[must_use]
    pub fn new(pipeline: RetrievalPipeline) -> Self {
        Self {
            stats: AgentStats::new(),
            pipeline,
        }
    }

    /// The underlying pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &RetrievalPipeline {
        &self.pipeline
    }

    /// Runs retrieval and returns the structured outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Embedding`] when the query cannot be embedded.
    pub async fn search(
        &self,
        query: &str,
        ctx: &RequestContext,
    ) -> Result<RetrievalOutcome, AgentError> {
        self.pipeline.run(query, ctx).await
    }
}

#[async_trait]
impl Agent for KnowledgeAgent {
    fn name(&self) -> &'static str {
        "knowledge_agent"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Knowledge
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
        let outcome = self.search(message, ctx).await?;
        debug!(
            outcome = match &outcome {
                RetrievalOutcome::NoResults => "no_results",
                RetrievalOutcome::LowConfidence { .. } => "low_confidence",
                RetrievalOutcome::Answered { .. } => "answered",
            },
            "knowledge lookup finished"
        );
        Ok(match outcome {
            RetrievalOutcome::Answered { answer, .. } => Reply::Answer(answer),
            other => Reply::notice(other.message()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::config::RetrievalConfig;

    #[tokio::test]
    async fn test_missing_embedder_becomes_apology() {
        let agent = KnowledgeAgent::new(RetrievalPipeline::new(RetrievalConfig::default(), "m"));
        let reply = agent
            .process("退货政策", &RequestContext::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(reply.is_apology());
        assert!(reply.text().contains("EmbeddingError"));
        assert_eq!(agent.stats().error_count(), 1);
    }
}
