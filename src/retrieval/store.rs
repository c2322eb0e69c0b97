//! Vector store contract, request scoping filter, and an in-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::embedding::{Embedder, cosine_similarity, embed_query};
use crate::context::RequestContext;
use crate::error::AgentError;

/// One scored hit as returned by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    /// Document identifier.
    pub id: String,
    /// Passage text.
    pub text: String,
    /// Similarity score (higher is closer).
    pub score: f32,
    /// Arbitrary document metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Scoping rules applied to every search of one request.
///
/// Documents without `user_id`/`tenant_id` metadata are public.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Only documents owned by this user (or public ones).
    pub user_id: Option<String>,
    /// Only documents of this tenant (or public ones).
    pub tenant_id: Option<String>,
}

impl SearchFilter {
    /// Builds the filter for a request; `None` when nothing scopes it.
    #[must_use]
    pub fn from_context(ctx: &RequestContext) -> Option<Self> {
        let filter = Self {
            user_id: ctx.user_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
        };
        (filter.user_id.is_some() || filter.tenant_id.is_some()).then_some(filter)
    }

    /// Renders a boolean filter expression for remote vector stores.
    #[must_use]
    pub fn to_expression(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(user) = &self.user_id {
            clauses.push(format!("(user_id == \"{}\" or user_id == \"\")", escape(user)));
        }
        if let Some(tenant) = &self.tenant_id {
            clauses.push(format!(
                "(tenant_id == \"{}\" or tenant_id == \"\")",
                escape(tenant)
            ));
        }
        clauses.join(" and ")
    }

    /// Evaluates the filter against document metadata.
    #[must_use]
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        let field_ok = |key: &str, wanted: Option<&String>| match (wanted, metadata.get(key)) {
            (None, _) | (_, None | Some(Value::Null)) => true,
            (Some(wanted), Some(Value::String(owner))) => owner.is_empty() || owner == wanted,
            (Some(_), Some(_)) => false,
        };
        field_ok("user_id", self.user_id.as_ref()) && field_ok("tenant_id", self.tenant_id.as_ref())
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Similarity search over named collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns up to `top_k` nearest neighbours of `vector` in `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::VectorSearch`] when the collection cannot be searched.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorHit>, AgentError>;
}

/// A document to index, as read from a knowledge file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Document identifier.
    pub id: String,
    /// Passage text.
    pub text: String,
    /// Target collection; the store's default when omitted.
    #[serde(default)]
    pub collection: Option<String>,
    /// Human-readable origin (file, URL, FAQ section).
    #[serde(default)]
    pub source: Option<String>,
    /// Extra metadata (`user_id`, `tenant_id`, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    text: String,
    vector: Vec<f32>,
    metadata: Map<String, Value>,
}

/// Brute-force cosine-similarity store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<StoredDocument>>>,
}

impl InMemoryVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pre-embedded document.
    pub fn insert(
        &self,
        collection: &str,
        id: impl Into<String>,
        text: impl Into<String>,
        vector: Vec<f32>,
        metadata: Map<String, Value>,
    ) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.into(),
                text: text.into(),
                vector,
                metadata,
            });
    }

    /// Embeds and indexes documents, returning how many were stored.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Embedding`] if any document cannot be embedded.
    pub async fn index_documents(
        &self,
        embedder: &dyn Embedder,
        default_collection: &str,
        documents: Vec<KnowledgeDocument>,
    ) -> Result<usize, AgentError> {
        let mut stored = 0;
        for doc in documents {
            let vector = embed_query(Some(embedder), &doc.text).await?;
            let mut metadata = doc.metadata;
            if let Some(source) = doc.source {
                metadata.insert("source".to_string(), Value::String(source));
            }
            let collection = doc.collection.as_deref().unwrap_or(default_collection);
            self.insert(collection, doc.id, doc.text, vector, metadata);
            stored += 1;
        }
        Ok(stored)
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, Vec::len)
    }

    /// Returns `true` if no collection holds any document.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(Vec::is_empty)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorHit>, AgentError> {
        let collections = self.collections.read();
        let Some(documents) = collections.get(collection) else {
            return Err(AgentError::VectorSearch {
                collection: collection.to_string(),
                message: "collection does not exist".to_string(),
            });
        };

        let mut hits: Vec<VectorHit> = documents
            .iter()
            .filter(|doc| filter.is_none_or(|f| f.matches(&doc.metadata)))
            .map(|doc| VectorHit {
                id: doc.id.clone(),
                text: doc.text.clone(),
                score: cosine_similarity(vector, &doc.vector),
                metadata: doc.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}
