//! Embedding service contract.

use async_trait::async_trait;

use crate::error::AgentError;

/// Encodes text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embedding model identifier.
    fn model(&self) -> &str;

    /// Encodes `text`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Embedding`] when the service is unavailable.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError>;
}

/// Embeds `text` and rejects empty vectors.
///
/// # Errors
///
/// Returns [`AgentError::Embedding`] when no embedder is configured, the
/// call fails, or the service returns an empty vector.
pub async fn embed_query(embedder: Option<&dyn Embedder>, text: &str) -> Result<Vec<f32>, AgentError> {
    let Some(embedder) = embedder else {
        return Err(AgentError::Embedding {
            message: "embedding service not configured".to_string(),
        });
    };
    let vector = embedder.embed(text).await.map_err(|e| match e {
        e @ AgentError::Embedding { .. } => e,
        other => AgentError::Embedding {
            message: other.to_string(),
        },
    })?;
    if vector.is_empty() {
        return Err(AgentError::Embedding {
            message: format!("model '{}' returned an empty vector", embedder.model()),
        });
    }
    Ok(vector)
}

/// Cosine similarity of two vectors; `0.0` for mismatched or zero vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
