//! Knowledge retrieval pipeline.
//!
//! Maps a natural-language query to a small, non-redundant evidence set and
//! a grounded answer:
//!
//! ```text
//! analyze -> embed -> search (per collection, concurrent) -> merge & sort
//!         -> rerank (optional) -> truncate -> filter -> assemble context -> answer
//! ```
//!
//! Every external collaborator ([`Embedder`], [`VectorStore`], [`Reranker`],
//! the LLM) is optional except the embedder: without a query vector nothing
//! can be retrieved and the pipeline fails fast.

pub mod analysis;
pub mod context;
pub mod embedding;
pub mod filter;
pub mod pipeline;
pub mod rerank;
pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use analysis::{QueryAnalysis, QueryType};
pub use embedding::Embedder;
pub use pipeline::{RetrievalOutcome, RetrievalPipeline, RetrievalReport};
pub use rerank::{KeywordReranker, RerankScore, Reranker};
pub use store::{InMemoryVectorStore, KnowledgeDocument, SearchFilter, VectorHit, VectorStore};

/// A scored candidate passage annotated with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document identifier.
    pub id: String,
    /// Passage text.
    pub text: String,
    /// Vector similarity score.
    pub score: f32,
    /// Collection the hit came from.
    pub collection: String,
    /// Human-readable source label; the collection name when unknown.
    pub source: String,
    /// Fused vector/rerank score, present once reranked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_score: Option<f32>,
    /// Document metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SearchHit {
    /// Creates a hit whose source is its collection.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        score: f32,
        collection: impl Into<String>,
    ) -> Self {
        let collection = collection.into();
        Self {
            id: id.into(),
            text: text.into(),
            score,
            source: collection.clone(),
            collection,
            combined_score: None,
            metadata: Map::new(),
        }
    }

    /// Annotates a store hit with the collection it came from.
    #[must_use]
    pub fn from_vector_hit(hit: VectorHit, collection: &str) -> Self {
        let source = hit
            .metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or(collection)
            .to_string();
        Self {
            id: hit.id,
            text: hit.text,
            score: hit.score,
            collection: collection.to_string(),
            source,
            combined_score: None,
            metadata: hit.metadata,
        }
    }

    /// Score used for ordering and thresholds: combined when reranked.
    #[must_use]
    pub fn effective_score(&self) -> f32 {
        self.combined_score.unwrap_or(self.score)
    }
}
