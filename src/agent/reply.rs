//! What an agent hands back for one message.

use crate::error::AgentError;

/// Outcome of [`Agent::process`](super::Agent::process).
///
/// Only an [`Reply::Answer`] is a result later workflow steps may build on.
/// Notices and apologies are user-legible text, never evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A result: retrieved knowledge, tool output, an analysis, a chat answer.
    Answer(String),
    /// Friendly text that carries no result, such as "nothing found".
    Notice(String),
    /// Apology for a failed `handle`.
    Apology {
        /// User-facing apology.
        text: String,
        /// Coarse category of the underlying error.
        category: &'static str,
    },
}

impl Reply {
    /// A result.
    #[must_use]
    pub fn answer(text: impl Into<String>) -> Self {
        Self::Answer(text.into())
    }

    /// Text that carries no result.
    #[must_use]
    pub fn notice(text: impl Into<String>) -> Self {
        Self::Notice(text.into())
    }

    /// Apology naming only the error's category.
    #[must_use]
    pub fn apology(error: &AgentError) -> Self {
        Self::Apology {
            text: format!(
                "抱歉，处理您的请求时遇到了问题（{}），请稍后再试。",
                error.category()
            ),
            category: error.category(),
        }
    }

    /// The user-facing text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Answer(text) | Self::Notice(text) | Self::Apology { text, .. } => text,
        }
    }

    /// Consumes the reply, keeping the text.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Answer(text) | Self::Notice(text) | Self::Apology { text, .. } => text,
        }
    }

    /// Returns `true` for a result.
    #[must_use]
    pub const fn is_answer(&self) -> bool {
        matches!(self, Self::Answer(_))
    }

    /// Returns `true` when `handle` failed.
    #[must_use]
    pub const fn is_apology(&self) -> bool {
        matches!(self, Self::Apology { .. })
    }

    /// Rewrites the text, keeping the variant.
    #[must_use]
    pub fn map_text(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            Self::Answer(text) => Self::Answer(f(text)),
            Self::Notice(text) => Self::Notice(f(text)),
            Self::Apology { text, category } => Self::Apology {
                text: f(text),
                category,
            },
        }
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Answer(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Answer(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apology_carries_category_only() {
        let reply = Reply::apology(&AgentError::Embedding {
            message: "connection refused".to_string(),
        });
        assert!(reply.is_apology());
        assert!(reply.text().contains("EmbeddingError"));
        assert!(!reply.text().contains("refused"));
        assert!(matches!(reply, Reply::Apology { category: "EmbeddingError", .. }));
    }

    #[test]
    fn test_map_text_keeps_variant() {
        let reply = Reply::notice("  nothing  ").map_text(|t| t.trim().to_string());
        assert_eq!(reply, Reply::Notice("nothing".to_string()));
        assert!(!reply.is_answer());
        assert_eq!(Reply::from("x").into_text(), "x");
    }
}
