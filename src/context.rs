//! Per-request configuration bag.
//!
//! [`RequestContext`] carries the options a caller attaches to a message:
//! who is asking, what was uploaded, and which optional workflow steps are
//! enabled. Workflow conditions read it; agents read it; nothing mutates it
//! except the engine, which attaches upstream step results on a clone.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;

/// Session key used when no `user_id` is present.
pub const ANONYMOUS_SESSION: &str = "anonymous";

const fn default_true() -> bool {
    true
}

/// Per-request overrides for the chat completion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOverrides {
    /// Model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Options recognized for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Caller identity; scopes history and knowledge search.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Tenant identity; scopes knowledge search.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Image references (paths or URLs) attached to the message.
    #[serde(default)]
    pub images: Vec<String>,
    /// File references attached to the message.
    #[serde(default)]
    pub files: Vec<String>,
    /// Gate for the knowledge step (default `true`).
    #[serde(default = "default_true")]
    pub enable_knowledge: bool,
    /// Gate for the tool step (default `true`).
    #[serde(default = "default_true")]
    pub enable_tools: bool,
    /// Narrows the searched collections for this request.
    #[serde(default)]
    pub collections: Option<Vec<String>>,
    /// Chat completion overrides.
    #[serde(default)]
    pub model: Option<ModelOverrides>,
    /// Results produced by earlier steps of the running workflow.
    #[serde(skip)]
    pub upstream: BTreeMap<AgentKind, String>,
    /// Kinds that already ran in this workflow, whatever they produced.
    #[serde(skip)]
    pub consulted: BTreeSet<AgentKind>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            user_id: None,
            tenant_id: None,
            images: Vec::new(),
            files: Vec::new(),
            enable_knowledge: true,
            enable_tools: true,
            collections: None,
            model: None,
            upstream: BTreeMap::new(),
            consulted: BTreeSet::new(),
        }
    }
}

impl RequestContext {
    /// Context for a known user.
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Returns `true` when images or files are attached.
    #[must_use]
    pub fn has_multimodal(&self) -> bool {
        !self.images.is_empty() || !self.files.is_empty()
    }

    /// Key used to shard per-user state such as chat history.
    #[must_use]
    pub fn session_key(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS_SESSION)
    }

    /// Result an earlier step produced for `kind`, if any.
    #[must_use]
    pub fn upstream_result(&self, kind: AgentKind) -> Option<&str> {
        self.upstream.get(&kind).map(String::as_str)
    }

    /// Returns `true` if a step for `kind` already ran in this workflow.
    #[must_use]
    pub fn was_consulted(&self, kind: AgentKind) -> bool {
        self.consulted.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_optional_steps() {
        let ctx = RequestContext::default();
        assert!(ctx.enable_knowledge);
        assert!(ctx.enable_tools);
        assert!(!ctx.has_multimodal());
        assert_eq!(ctx.session_key(), ANONYMOUS_SESSION);
    }

    #[test]
    fn test_deserialize_missing_flags_default_true() {
        let ctx: RequestContext =
            serde_json::from_str(r#"{"user_id": "u1", "images": ["a.png"]}"#)
                .unwrap_or_else(|_| unreachable!());
        assert!(ctx.enable_knowledge);
        assert!(ctx.enable_tools);
        assert!(ctx.has_multimodal());
        assert_eq!(ctx.session_key(), "u1");
    }

    #[test]
    fn test_deserialize_disabled_tools() {
        let ctx: RequestContext = serde_json::from_str(r#"{"enable_tools": false}"#)
            .unwrap_or_else(|_| unreachable!());
        assert!(!ctx.enable_tools);
        assert!(ctx.enable_knowledge);
    }
}
