//! Context-window assembly.

use super::SearchHit;

/// Separator placed between passages.
const PASSAGE_SEPARATOR: &str = "\n\n";

/// Formats one hit as a labeled passage (`index` is 1-based).
#[must_use]
pub fn format_passage(index: usize, hit: &SearchHit) -> String {
    format!(
        "知识片段{index} (相关度: {:.3}, 来源: {}): {}",
        hit.effective_score(),
        hit.source,
        hit.text.trim()
    )
}

/// Joins passages until the next one would exceed `max_chars`.
///
/// The budget counts characters including separators. Passages are never
/// truncated: the first one that does not fit ends assembly.
#[must_use]
pub fn build_context(hits: &[SearchHit], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0;
    for (i, hit) in hits.iter().enumerate() {
        let passage = format_passage(i + 1, hit);
        let separator = if context.is_empty() { 0 } else { PASSAGE_SEPARATOR.chars().count() };
        let needed = separator + passage.chars().count();
        if used + needed > max_chars {
            break;
        }
        if separator > 0 {
            context.push_str(PASSAGE_SEPARATOR);
        }
        context.push_str(&passage);
        used += needed;
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_passage_format() {
        let hit = SearchHit::new("a", " 七天无理由退货 ", 0.91234, "faq");
        assert_eq!(
            format_passage(1, &hit),
            "知识片段1 (相关度: 0.912, 来源: faq): 七天无理由退货"
        );
    }

    #[test]
    fn test_stops_before_overflow() {
        let hits = vec![
            SearchHit::new("a", "x".repeat(20), 0.9, "faq"),
            SearchHit::new("b", "y".repeat(20), 0.8, "faq"),
        ];
        let first = format_passage(1, &hits[0]).chars().count();
        let context = build_context(&hits, first + 5);
        assert_eq!(context.chars().count(), first);
        assert!(!context.contains('y'));
    }

    #[test]
    fn test_first_passage_too_long() {
        let hits = vec![SearchHit::new("a", "x".repeat(100), 0.9, "faq")];
        assert!(build_context(&hits, 10).is_empty());
    }

    proptest! {
        #[test]
        fn prop_context_within_budget(
            texts in prop::collection::vec("[a-z ]{10,80}", 0..10),
            budget in 1usize..600,
        ) {
            let hits: Vec<SearchHit> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| SearchHit::new(i.to_string(), t.clone(), 0.8, "faq"))
                .collect();
            let context = build_context(&hits, budget);
            prop_assert!(context.chars().count() <= budget);

            // every included passage is complete
            let included = if context.is_empty() { 0 } else { context.split(PASSAGE_SEPARATOR).count() };
            let expected: Vec<String> = hits
                .iter()
                .take(included)
                .enumerate()
                .map(|(i, h)| format_passage(i + 1, h))
                .collect();
            prop_assert_eq!(context, expected.join(PASSAGE_SEPARATOR));
        }
    }
}
