//! Retrieval pipeline orchestration.

use std::fmt::Write;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::analysis::QueryAnalysis;
use super::context::build_context;
use super::embedding::{Embedder, embed_query};
use super::filter::filter_hits;
use super::rerank::{Reranker, rerank_hits};
use super::store::{SearchFilter, VectorStore};
use super::SearchHit;
use crate::agent::config::RetrievalConfig;
use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::prompt::{KNOWLEDGE_SYSTEM_PROMPT, build_knowledge_prompt};
use crate::agent::provider::LlmProvider;
use crate::context::RequestContext;
use crate::error::AgentError;

/// Reply when vector search returns nothing at all.
pub const NO_RESULTS_MESSAGE: &str =
    "抱歉，我在知识库中没有找到与您问题相关的信息。建议您换个说法或使用更宽泛的关键词再试一次。";
/// Reply when hits exist but none survive filtering.
pub const LOW_CONFIDENCE_MESSAGE: &str =
    "我找到了一些可能相关的信息，但相关度不够高，无法给出可靠的回答。建议您提供更具体的问题描述或关键词。";

/// Hits quoted by the templated fallback answer.
const FALLBACK_TOP_N: usize = 3;

/// Intermediate results of one retrieval (stages 1-7).
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalReport {
    /// Query analysis.
    pub analysis: QueryAnalysis,
    /// Hits returned by all collections before filtering.
    pub raw_count: usize,
    /// Whether the rerank stage was applied.
    pub reranked: bool,
    /// Filtered hits in ranking order.
    pub hits: Vec<SearchHit>,
}

/// Final outcome of a retrieval.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    /// Vector search found nothing.
    NoResults,
    /// Hits were found but all were filtered out.
    LowConfidence {
        /// Number of hits before filtering.
        candidates: usize,
    },
    /// An answer was produced from the surviving hits.
    Answered {
        /// Answer text.
        answer: String,
        /// Evidence used.
        hits: Vec<SearchHit>,
        /// Whether the answer came from the LLM rather than the template.
        generated: bool,
    },
}

impl RetrievalOutcome {
    /// User-facing text for this outcome.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::NoResults => NO_RESULTS_MESSAGE,
            Self::LowConfidence { .. } => LOW_CONFIDENCE_MESSAGE,
            Self::Answered { answer, .. } => answer,
        }
    }
}

/// The retrieval pipeline and its collaborators.
#[derive(Clone)]
pub struct RetrievalPipeline {
    config: RetrievalConfig,
    embedder: Option<Arc<dyn Embedder>>,
    store: Option<Arc<dyn VectorStore>>,
    reranker: Option<Arc<dyn Reranker>>,
    llm: Option<Arc<dyn LlmProvider>>,
    model: String,
    system_prompt: String,
}

impl RetrievalPipeline {
    /// Creates a pipeline with no collaborators attached.
    #[must_use]
    pub fn new(config: RetrievalConfig, model: impl Into<String>) -> Self {
        Self {
            config,
            embedder: None,
            store: None,
            reranker: None,
            llm: None,
            model: model.into(),
            system_prompt: KNOWLEDGE_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Attaches the embedding service.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Attaches the vector store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attaches the rerank service.
    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Attaches the LLM used for answer generation.
    #[must_use]
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Overrides the answer-generation system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Pipeline parameters.
    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Runs retrieval up to and including filtering.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Embedding`] when the query cannot be embedded.
    /// Per-collection search failures are logged and skipped.
    pub async fn retrieve(
        &self,
        query: &str,
        ctx: &RequestContext,
    ) -> Result<RetrievalReport, AgentError> {
        let analysis =
            QueryAnalysis::analyze(query, &self.config.collections, ctx.collections.as_deref());
        debug!(
            query_type = ?analysis.query_type,
            keywords = analysis.keywords.len(),
            collections = ?analysis.collections_to_search,
            "analyzed query"
        );

        let vector = embed_query(self.embedder.as_deref(), query).await?;

        let mut hits = self
            .search_collections(&analysis.collections_to_search, &vector, ctx)
            .await;
        let raw_count = hits.len();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        let (mut hits, reranked) =
            rerank_hits(self.reranker.as_deref(), query, hits, self.config.rerank_top_k).await;
        let keep = if reranked {
            self.config.rerank_top_k
        } else {
            self.config.search_top_k
        };
        hits.truncate(keep);

        let hits = filter_hits(hits, self.config.similarity_threshold);
        info!(raw_count, kept = hits.len(), reranked, "retrieval complete");

        Ok(RetrievalReport {
            analysis,
            raw_count,
            reranked,
            hits,
        })
    }

    /// Runs the full pipeline and produces an outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Embedding`] when the query cannot be embedded.
    pub async fn run(
        &self,
        query: &str,
        ctx: &RequestContext,
    ) -> Result<RetrievalOutcome, AgentError> {
        let report = self.retrieve(query, ctx).await?;
        if report.raw_count == 0 {
            return Ok(RetrievalOutcome::NoResults);
        }
        if report.hits.is_empty() {
            return Ok(RetrievalOutcome::LowConfidence {
                candidates: report.raw_count,
            });
        }

        let context = build_context(&report.hits, self.config.max_context_length);
        let (answer, generated) = match self.generate(query, &context).await {
            Some(answer) => (answer, true),
            None => (template_answer(&report.hits), false),
        };
        Ok(RetrievalOutcome::Answered {
            answer,
            hits: report.hits,
            generated,
        })
    }

    async fn search_collections(
        &self,
        collections: &[String],
        vector: &[f32],
        ctx: &RequestContext,
    ) -> Vec<SearchHit> {
        let Some(store) = self.store.as_deref() else {
            warn!("no vector store configured");
            return Vec::new();
        };
        let filter = SearchFilter::from_context(ctx);
        let top_k = self.config.search_top_k;

        let searches = collections.iter().map(|collection| {
            let filter = filter.as_ref();
            async move {
                (
                    collection,
                    store.search(collection, vector, top_k, filter).await,
                )
            }
        });

        let mut merged = Vec::new();
        for (collection, result) in join_all(searches).await {
            match result {
                Ok(hits) => {
                    debug!(collection = %collection, hits = hits.len(), "collection searched");
                    merged.extend(
                        hits.into_iter()
                            .map(|hit| SearchHit::from_vector_hit(hit, collection)),
                    );
                }
                Err(e) => warn!(collection = %collection, error = %e, "collection search failed, skipping"),
            }
        }
        merged
    }

    /// Asks the LLM for a grounded answer; `None` means use the template.
    async fn generate(&self, query: &str, context: &str) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                system_message(&self.system_prompt),
                user_message(&build_knowledge_prompt(query, context)),
            ],
        )
        .with_temperature(self.config.answer_temperature)
        .with_max_tokens(self.config.answer_max_tokens);

        match llm.chat(&request).await {
            Ok(response) if !response.content.trim().is_empty() => Some(response.content),
            Ok(_) => {
                debug!("empty answer from LLM, using template");
                None
            }
            Err(e) => {
                warn!(error = %e, "answer generation failed, using template");
                None
            }
        }
    }
}

/// Deterministic answer quoting the top hits.
#[must_use]
pub fn template_answer(hits: &[SearchHit]) -> String {
    let mut answer = String::from("根据知识库中的信息，为您找到以下内容：\n");
    for (i, hit) in hits.iter().take(FALLBACK_TOP_N).enumerate() {
        let _ = write!(answer, "\n{}. {}（来源: {}）", i + 1, hit.text.trim(), hit.source);
    }
    answer
}

impl std::fmt::Debug for RetrievalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPipeline")
            .field("config", &self.config)
            .field("embedder", &self.embedder.as_ref().map(|e| e.model().to_string()))
            .field("store", &self.store.is_some())
            .field("reranker", &self.reranker.is_some())
            .field("llm", &self.llm.as_ref().map(|l| l.name()))
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
