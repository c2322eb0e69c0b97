//! Agent trait definition.
//!
//! All agents (chat, knowledge, tool, multimodal) implement this trait,
//! which provides a uniform interface for the workflow engine.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::provider::TextStream;
use super::reply::Reply;
use super::stats::{AgentStats, AgentStatus, FAILING_ERROR_RATE};
use super::AgentKind;
use crate::context::RequestContext;
use crate::error::AgentError;

/// Trait implemented by all agents in the system.
///
/// Implementors provide [`Agent::handle`]; callers use [`Agent::process`],
/// which wraps it with counters, hooks, cancellation and the error
/// fallback.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &str;

    /// Agent kind.
    fn kind(&self) -> AgentKind;

    /// Telemetry counters.
    fn stats(&self) -> &AgentStats;

    /// Variant-specific work.
    ///
    /// Text that answers nothing ("no tool needed", "nothing found") is
    /// returned as [`Reply::Notice`].
    ///
    /// # Errors
    ///
    /// Any [`AgentError`]; [`Agent::process`] turns it into an apology.
    async fn handle(
        &self,
        message: &str,
        ctx: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Reply, AgentError>;

    /// Normalizes the incoming message.
    fn preprocess(&self, message: &str) -> String {
        message.trim().to_string()
    }

    /// Adjusts the produced response.
    fn postprocess(&self, response: String) -> String {
        response.trim().to_string()
    }

    /// Processes a message: `preprocess -> handle -> postprocess`.
    ///
    /// Failures of `handle` become [`Reply::Apology`] and increment the
    /// error counter.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] only; nothing else propagates.
    async fn process(
        &self,
        message: &str,
        ctx: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Reply, AgentError> {
        self.stats().record_message();
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let input = self.preprocess(message);
        let result = tokio::select! {
            () = cancel.cancelled() => Err(AgentError::Cancelled),
            result = self.handle(&input, ctx, cancel) => result,
        };

        match result {
            Ok(reply) => {
                debug!(agent = self.name(), chars = reply.text().chars().count(), "handled message");
                Ok(reply.map_text(|text| self.postprocess(text)))
            }
            Err(AgentError::Cancelled) => {
                debug!(agent = self.name(), "request cancelled");
                Err(AgentError::Cancelled)
            }
            Err(e) => {
                self.stats().record_error();
                warn!(agent = self.name(), error = %e, "agent failed");
                Ok(Reply::apology(&e))
            }
        }
    }

    /// Native streaming, when the agent supports it.
    ///
    /// `None` means the caller should simulate streaming from
    /// [`Agent::process`].
    async fn stream(
        &self,
        _message: &str,
        _ctx: &RequestContext,
        _cancel: &CancellationToken,
    ) -> Option<Result<TextStream, AgentError>> {
        None
    }

    /// Status snapshot.
    fn status(&self) -> AgentStatus {
        self.stats().snapshot(self.name(), self.kind())
    }

    /// Fails when the all-time error rate exceeds 0.5.
    async fn health_check(&self) -> bool {
        self.stats().error_rate() <= FAILING_ERROR_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyAgent {
        stats: AgentStats,
    }

    #[async_trait]
    impl Agent for FlakyAgent {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn kind(&self) -> AgentKind {
            AgentKind::Tool
        }

        fn stats(&self) -> &AgentStats {
            &self.stats
        }

        async fn handle(
            &self,
            message: &str,
            _ctx: &RequestContext,
            _cancel: &CancellationToken,
        ) -> Result<Reply, AgentError> {
            if message == "fail" {
                Err(AgentError::Embedding {
                    message: "down".to_string(),
                })
            } else {
                Ok(Reply::answer(format!("  echo: {message}  ")))
            }
        }
    }

    fn agent() -> FlakyAgent {
        FlakyAgent {
            stats: AgentStats::new(),
        }
    }

    #[tokio::test]
    async fn test_process_trims_and_counts() {
        let agent = agent();
        let response = agent
            .process("  hi ", &RequestContext::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(response, Reply::answer("echo: hi"));
        assert_eq!(agent.stats().message_count(), 1);
        assert_eq!(agent.stats().error_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_becomes_apology() {
        let agent = agent();
        let response = agent
            .process("fail", &RequestContext::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(response.is_apology());
        assert!(response.text().contains("EmbeddingError"));
        assert!(!response.text().contains("down"));
        assert_eq!(agent.stats().error_count(), 1);
        assert!(!agent.status().is_healthy);
        assert!(!agent.health_check().await);
    }

    #[tokio::test]
    async fn test_cancelled_propagates() {
        let agent = agent();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = agent.process("hi", &RequestContext::default(), &cancel).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert_eq!(agent.stats().error_count(), 0);
    }
}
