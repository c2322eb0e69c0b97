//! Optional rerank stage.
//!
//! Reranking is an enhancement: when the service fails the stage passes its
//! input through in the original order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::SearchHit;
use super::analysis::extract_keywords;
use crate::error::AgentError;

/// Weight of the vector score in the combined score.
pub const VECTOR_WEIGHT: f32 = 0.7;
/// Weight of the rerank score in the combined score.
pub const RERANK_WEIGHT: f32 = 0.3;

/// Relevance assigned by a reranker to one input document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    /// Index into the documents passed to [`Reranker::rerank`].
    pub index: usize,
    /// Relevance in `[0, 1]`.
    pub score: f32,
}

/// Scores documents against a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns scores for (up to `top_k` of) `documents`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Rerank`] when the service is unavailable.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankScore>, AgentError>;
}

/// Local lexical reranker: fraction of query keywords present in a document.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordReranker;

#[async_trait]
impl Reranker for KeywordReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RerankScore>, AgentError> {
        let keywords = extract_keywords(query);
        if keywords.is_empty() {
            return Err(AgentError::Rerank {
                message: "query has no keywords".to_string(),
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let mut scores: Vec<RerankScore> = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                let lowered = doc.to_lowercase();
                let covered = keywords.iter().filter(|k| lowered.contains(k.as_str())).count();
                RerankScore {
                    index,
                    score: covered as f32 / keywords.len() as f32,
                }
            })
            .collect();
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        scores.truncate(top_k);
        Ok(scores)
    }
}

/// Applies the reranker to `hits`.
///
/// Skipped when no reranker is configured or there is at most one hit.
/// Returns the hits and whether a rerank was applied; on failure the hits
/// come back unchanged.
pub async fn rerank_hits(
    reranker: Option<&dyn Reranker>,
    query: &str,
    hits: Vec<SearchHit>,
    top_k: usize,
) -> (Vec<SearchHit>, bool) {
    let Some(reranker) = reranker else {
        return (hits, false);
    };
    if hits.len() <= 1 {
        return (hits, false);
    }

    let documents: Vec<String> = hits.iter().map(|h| h.text.clone()).collect();
    // every hit is scored; truncation happens later in the pipeline
    let scores = match reranker.rerank(query, &documents, documents.len()).await {
        Ok(scores) => scores,
        Err(e) => {
            warn!(error = %e, "rerank failed, keeping vector order");
            return (hits, false);
        }
    };

    let mut rerank_scores = vec![None; hits.len()];
    for RerankScore { index, score } in scores {
        if let Some(slot) = rerank_scores.get_mut(index) {
            *slot = Some(score);
        }
    }

    let mut reranked: Vec<SearchHit> = hits
        .into_iter()
        .zip(rerank_scores)
        .map(|(mut hit, rerank)| {
            hit.combined_score =
                Some(VECTOR_WEIGHT.mul_add(hit.score, RERANK_WEIGHT * rerank.unwrap_or(0.0)));
            hit
        })
        .collect();
    reranked.sort_by(|a, b| b.effective_score().total_cmp(&a.effective_score()));
    debug!(hits = reranked.len(), top_k, "reranked hits");
    (reranked, true)
}
