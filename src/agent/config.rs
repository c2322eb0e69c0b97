//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
/// Default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default chat sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default max tokens for chat completions.
const DEFAULT_MAX_TOKENS: u32 = 2048;
/// Default number of conversation turns kept per session.
const DEFAULT_MAX_HISTORY_LENGTH: usize = 10;
/// Default number of sessions whose history is kept in memory.
const DEFAULT_MAX_SESSIONS: u64 = 1000;
/// Default cap on tool calls per request.
const DEFAULT_MAX_TOOL_CALLS: usize = 5;
/// Default per-tool timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
/// Default delay between simulated stream units.
const DEFAULT_STREAM_DELAY_MS: u64 = 10;
/// Default nearest neighbours requested per collection.
const DEFAULT_SEARCH_TOP_K: usize = 10;
/// Default hits kept after reranking.
const DEFAULT_RERANK_TOP_K: usize = 5;
/// Default minimum relevance for a hit to be used.
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;
/// Default character budget for assembled context.
const DEFAULT_MAX_CONTEXT_LENGTH: usize = 4000;
/// Default collection searched when none is configured.
const DEFAULT_COLLECTION: &str = "knowledge_base";
/// Temperature for grounded answer generation.
const DEFAULT_ANSWER_TEMPERATURE: f32 = 0.3;
/// Max tokens for grounded answer generation.
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 1024;

/// Retrieval pipeline parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Nearest neighbours requested from each collection.
    pub search_top_k: usize,
    /// Hits kept after a successful rerank.
    pub rerank_top_k: usize,
    /// Minimum score (or combined score) a hit needs to survive filtering.
    pub similarity_threshold: f32,
    /// Character budget for the assembled context.
    pub max_context_length: usize,
    /// Collections a query may search.
    pub collections: Vec<String>,
    /// Temperature for answer generation; low for precision.
    pub answer_temperature: f32,
    /// Token limit for answer generation.
    pub answer_max_tokens: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_top_k: DEFAULT_SEARCH_TOP_K,
            rerank_top_k: DEFAULT_RERANK_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_context_length: DEFAULT_MAX_CONTEXT_LENGTH,
            collections: vec![DEFAULT_COLLECTION.to_string()],
            answer_temperature: DEFAULT_ANSWER_TEMPERATURE,
            answer_max_tokens: DEFAULT_ANSWER_MAX_TOKENS,
        }
    }
}

impl RetrievalConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), AgentError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(config_error(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.search_top_k == 0 || self.rerank_top_k == 0 {
            return Err(config_error("top-k values must be at least 1"));
        }
        if self.max_context_length == 0 {
            return Err(config_error("max_context_length must be at least 1"));
        }
        if self.collections.is_empty() {
            return Err(config_error("at least one collection is required"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> AgentError {
    AgentError::Config {
        message: message.into(),
    }
}

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider. Without one the system runs on fallbacks.
    pub api_key: Option<String>,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for chat completions.
    pub chat_model: String,
    /// Model for embeddings.
    pub embedding_model: String,
    /// Default chat sampling temperature.
    pub temperature: f32,
    /// Default max tokens for chat completions.
    pub max_tokens: u32,
    /// Conversation turns kept per session.
    pub max_history_length: usize,
    /// Sessions whose history is kept; the least recently used are evicted.
    pub max_sessions: u64,
    /// Maximum tool calls executed per request.
    pub max_tool_calls: usize,
    /// Timeout applied to tools that do not declare their own.
    pub tool_timeout: Duration,
    /// Delay between units when streaming is simulated.
    pub stream_delay: Duration,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
    /// Retrieval pipeline parameters.
    pub retrieval: RetrievalConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            base_url: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            stream_delay: Duration::from_millis(DEFAULT_STREAM_DELAY_MS),
            prompt_dir: None,
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if an environment value is out of range.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    chat_model: Option<String>,
    embedding_model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_history_length: Option<usize>,
    max_sessions: Option<u64>,
    max_tool_calls: Option<usize>,
    tool_timeout: Option<Duration>,
    stream_delay: Option<Duration>,
    prompt_dir: Option<PathBuf>,
    search_top_k: Option<usize>,
    rerank_top_k: Option<usize>,
    similarity_threshold: Option<f32>,
    max_context_length: Option<usize>,
    collections: Option<Vec<String>>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("ASSISTFLOW_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("ASSISTFLOW_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("ASSISTFLOW_BASE_URL"))
                .ok();
        }
        if self.chat_model.is_none() {
            self.chat_model = std::env::var("ASSISTFLOW_CHAT_MODEL").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("ASSISTFLOW_EMBEDDING_MODEL").ok();
        }
        if self.similarity_threshold.is_none() {
            self.similarity_threshold = env_parse("ASSISTFLOW_SIMILARITY_THRESHOLD");
        }
        if self.search_top_k.is_none() {
            self.search_top_k = env_parse("ASSISTFLOW_SEARCH_TOP_K");
        }
        if self.rerank_top_k.is_none() {
            self.rerank_top_k = env_parse("ASSISTFLOW_RERANK_TOP_K");
        }
        if self.max_context_length.is_none() {
            self.max_context_length = env_parse("ASSISTFLOW_MAX_CONTEXT_LENGTH");
        }
        if self.collections.is_none() {
            self.collections = std::env::var("ASSISTFLOW_COLLECTIONS").ok().map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            });
        }
        if self.max_sessions.is_none() {
            self.max_sessions = env_parse("ASSISTFLOW_MAX_SESSIONS");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("ASSISTFLOW_PROMPT_DIR")
                .ok()
                .map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the chat temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the chat max tokens.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the number of conversation turns kept per session.
    #[must_use]
    pub const fn max_history_length(mut self, n: usize) -> Self {
        self.max_history_length = Some(n);
        self
    }

    /// Sets the number of sessions whose history is kept.
    #[must_use]
    pub const fn max_sessions(mut self, n: u64) -> Self {
        self.max_sessions = Some(n);
        self
    }

    /// Sets the maximum tool calls per request.
    #[must_use]
    pub const fn max_tool_calls(mut self, n: usize) -> Self {
        self.max_tool_calls = Some(n);
        self
    }

    /// Sets the default tool timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Sets the delay between simulated stream units.
    #[must_use]
    pub const fn stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = Some(delay);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the per-collection search depth.
    #[must_use]
    pub const fn search_top_k(mut self, n: usize) -> Self {
        self.search_top_k = Some(n);
        self
    }

    /// Sets the number of hits kept after reranking.
    #[must_use]
    pub const fn rerank_top_k(mut self, n: usize) -> Self {
        self.rerank_top_k = Some(n);
        self
    }

    /// Sets the similarity threshold.
    #[must_use]
    pub const fn similarity_threshold(mut self, t: f32) -> Self {
        self.similarity_threshold = Some(t);
        self
    }

    /// Sets the context character budget.
    #[must_use]
    pub const fn max_context_length(mut self, n: usize) -> Self {
        self.max_context_length = Some(n);
        self
    }

    /// Sets the searchable collections.
    #[must_use]
    pub fn collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = Some(collections.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if a value is out of range.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let defaults = AgentConfig::default();
        let retrieval_defaults = RetrievalConfig::default();

        let retrieval = RetrievalConfig {
            search_top_k: self.search_top_k.unwrap_or(retrieval_defaults.search_top_k),
            rerank_top_k: self.rerank_top_k.unwrap_or(retrieval_defaults.rerank_top_k),
            similarity_threshold: self
                .similarity_threshold
                .unwrap_or(retrieval_defaults.similarity_threshold),
            max_context_length: self
                .max_context_length
                .unwrap_or(retrieval_defaults.max_context_length),
            collections: self.collections.unwrap_or(retrieval_defaults.collections),
            ..retrieval_defaults
        };
        retrieval.validate()?;

        let max_history_length = self
            .max_history_length
            .unwrap_or(defaults.max_history_length);
        if max_history_length == 0 {
            return Err(config_error("max_history_length must be at least 1"));
        }
        let max_sessions = self.max_sessions.unwrap_or(defaults.max_sessions);
        if max_sessions == 0 {
            return Err(config_error("max_sessions must be at least 1"));
        }

        Ok(AgentConfig {
            provider: self.provider.unwrap_or(defaults.provider),
            api_key: self.api_key,
            base_url: self.base_url,
            chat_model: self.chat_model.unwrap_or(defaults.chat_model),
            embedding_model: self.embedding_model.unwrap_or(defaults.embedding_model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            max_history_length,
            max_sessions,
            max_tool_calls: self.max_tool_calls.unwrap_or(defaults.max_tool_calls),
            tool_timeout: self.tool_timeout.unwrap_or(defaults.tool_timeout),
            stream_delay: self.stream_delay.unwrap_or(defaults.stream_delay),
            prompt_dir: self.prompt_dir,
            retrieval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert!(config.api_key.is_none());
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.retrieval.search_top_k, DEFAULT_SEARCH_TOP_K);
        assert_eq!(config.retrieval.rerank_top_k, DEFAULT_RERANK_TOP_K);
        assert_eq!(config.retrieval.collections, vec!["knowledge_base".to_string()]);
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .chat_model("qwen-plus")
            .similarity_threshold(0.5)
            .max_context_length(1200)
            .collections(["faq", "manuals"])
            .stream_delay(Duration::from_millis(1))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.chat_model, "qwen-plus");
        assert!((config.retrieval.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.max_context_length, 1200);
        assert_eq!(config.retrieval.collections.len(), 2);
        assert_eq!(config.stream_delay, Duration::from_millis(1));
    }

    #[test]
    fn test_builder_rejects_bad_threshold() {
        let result = AgentConfig::builder().similarity_threshold(1.5).build();
        assert!(matches!(result, Err(AgentError::Config { .. })));
    }

    #[test]
    fn test_builder_rejects_empty_collections() {
        let result = AgentConfig::builder()
            .collections(Vec::<String>::new())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_top_k() {
        assert!(AgentConfig::builder().search_top_k(0).build().is_err());
        assert!(AgentConfig::builder().max_history_length(0).build().is_err());
        assert!(AgentConfig::builder().max_sessions(0).build().is_err());
    }
}
