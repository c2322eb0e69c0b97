//! Agent kind tag.

use serde::{Deserialize, Serialize};

/// The closed set of agent specializations.
///
/// Workflow steps name the kind they dispatch to; the orchestrator maps each
/// kind to exactly one live agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// General conversation; the terminal, user-facing step.
    Chat,
    /// Knowledge-base retrieval and grounded answering.
    Knowledge,
    /// Tool detection and execution.
    Tool,
    /// Image and file analysis.
    Multimodal,
}

impl AgentKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [Self::Chat, Self::Knowledge, Self::Tool, Self::Multimodal];

    /// Parses a kind name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "knowledge" => Some(Self::Knowledge),
            "tool" | "tools" => Some(Self::Tool),
            "multimodal" => Some(Self::Multimodal),
            _ => None,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Knowledge => "knowledge",
            Self::Tool => "tool",
            Self::Multimodal => "multimodal",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AgentKind::parse("TOOLS"), Some(AgentKind::Tool));
        assert_eq!(AgentKind::parse("planner"), None);
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&AgentKind::Multimodal).unwrap_or_default();
        assert_eq!(json, "\"multimodal\"");
    }
}
