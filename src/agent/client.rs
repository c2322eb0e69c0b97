//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;
use crate::retrieval::Embedder;

/// Service handles backed by one provider.
#[derive(Clone)]
pub struct ProviderHandles {
    /// Chat completion service.
    pub llm: Arc<dyn LlmProvider>,
    /// Embedding service.
    pub embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for ProviderHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandles")
            .field("llm", &self.llm.name())
            .field("embedding_model", &self.embedder.model())
            .finish()
    }
}

/// Creates service handles based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default): OpenAI-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names
/// (or when the provider's feature is disabled) and
/// [`AgentError::ApiKeyMissing`] when no key is configured.
pub fn create_provider(config: &AgentConfig) -> Result<ProviderHandles, AgentError> {
    match config.provider.as_str() {
        #[cfg(feature = "openai")]
        "openai" => {
            let provider = Arc::new(crate::agent::providers::OpenAiProvider::new(config)?);
            Ok(ProviderHandles {
                llm: provider.clone(),
                embedder: provider,
            })
        }
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "openai")]
    #[test]
    fn test_create_openai_provider() {
        let config = AgentConfig::builder()
            .api_key("test")
            .provider("openai")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let handles = create_provider(&config).unwrap_or_else(|_| unreachable!());
        assert_eq!(handles.llm.name(), "openai");
        assert_eq!(handles.embedder.model(), config.embedding_model);
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_missing_key() {
        let config = AgentConfig::default();
        assert!(matches!(
            create_provider(&config),
            Err(AgentError::ApiKeyMissing)
        ));
    }

    #[test]
    fn test_create_unknown_provider() {
        let config = AgentConfig::builder()
            .api_key("test")
            .provider("unknown")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let result = create_provider(&config);
        assert!(matches!(result, Err(AgentError::UnsupportedProvider { .. })));
    }
}
