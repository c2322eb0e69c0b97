//! Rule-based query analysis.
//!
//! Classifies a query by keyword family, extracts keywords by stop-word
//! removal and resolves which collections to search.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Cues for definition questions.
const DEFINITION_CUES: &[&str] = &["什么是", "是什么", "定义", "含义", "what is", "define", "meaning of"];
/// Cues for procedural questions.
const HOW_TO_CUES: &[&str] = &["如何", "怎么", "怎样", "步骤", "方法", "how to", "how do", "steps"];
/// Cues for explanation questions.
const EXPLANATION_CUES: &[&str] = &["为什么", "原因", "解释", "为何", "why", "explain", "reason"];
/// Cues for comparison questions.
const COMPARISON_CUES: &[&str] = &["区别", "比较", "对比", "不同", "差异", "difference", "compare", " vs "];

/// Words dropped during keyword extraction.
const STOP_WORDS: &[&str] = &[
    "的", "了", "是", "在", "我", "有", "和", "就", "不", "都", "一", "也", "很", "到", "说",
    "要", "去", "你", "会", "着", "看", "好", "这", "那", "吗", "呢", "吧", "啊", "么", "什",
    "怎", "如", "何", "请", "问", "the", "a", "an", "is", "are", "was", "were", "be", "to",
    "of", "and", "or", "in", "on", "for", "with", "what", "how", "why", "who", "which", "does",
    "do", "can", "i", "you", "it", "this", "that", "my", "me", "please",
];

/// Query classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// "What is X".
    Definition,
    /// "How do I X".
    HowTo,
    /// "Why X".
    Explanation,
    /// "X vs Y".
    Comparison,
    /// Anything else.
    General,
}

impl QueryType {
    /// Classifies a query by keyword-family membership.
    ///
    /// Families are tested in a fixed order; the first hit wins.
    #[must_use]
    pub fn classify(query: &str) -> Self {
        let lowered = query.to_lowercase();
        let hit = |cues: &[&str]| cues.iter().any(|cue| lowered.contains(cue));
        if hit(DEFINITION_CUES) {
            Self::Definition
        } else if hit(HOW_TO_CUES) {
            Self::HowTo
        } else if hit(EXPLANATION_CUES) {
            Self::Explanation
        } else if hit(COMPARISON_CUES) {
            Self::Comparison
        } else {
            Self::General
        }
    }

    /// Intent label used in logs and reports.
    #[must_use]
    pub const fn intent(self) -> &'static str {
        match self {
            Self::Definition => "seek_definition",
            Self::HowTo => "seek_procedure",
            Self::Explanation => "seek_reason",
            Self::Comparison => "compare_options",
            Self::General => "general_inquiry",
        }
    }
}

/// Ephemeral analysis of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Classified query type.
    pub query_type: QueryType,
    /// Keywords left after stop-word removal, in first-seen order.
    pub keywords: Vec<String>,
    /// Intent label derived from the query type.
    pub intent: String,
    /// Collections the search stage will query.
    pub collections_to_search: Vec<String>,
}

impl QueryAnalysis {
    /// Analyzes `query`.
    ///
    /// `requested` narrows the `allowed` collections; a request that shares
    /// nothing with `allowed` falls back to all of them.
    #[must_use]
    pub fn analyze(query: &str, allowed: &[String], requested: Option<&[String]>) -> Self {
        let query_type = QueryType::classify(query);
        Self {
            query_type,
            keywords: extract_keywords(query),
            intent: query_type.intent().to_string(),
            collections_to_search: resolve_collections(allowed, requested),
        }
    }
}

/// Extracts keywords by stop-word removal.
#[must_use]
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in query.unicode_words() {
        let word = word.to_lowercase();
        if STOP_WORDS.contains(&word.as_str()) || keywords.contains(&word) {
            continue;
        }
        keywords.push(word);
    }
    keywords
}

fn resolve_collections(allowed: &[String], requested: Option<&[String]>) -> Vec<String> {
    let Some(requested) = requested else {
        return allowed.to_vec();
    };
    let narrowed: Vec<String> = allowed
        .iter()
        .filter(|c| requested.contains(c))
        .cloned()
        .collect();
    if narrowed.is_empty() {
        tracing::debug!(?requested, "requested collections not allowed, searching all");
        allowed.to_vec()
    } else {
        narrowed
    }
}
