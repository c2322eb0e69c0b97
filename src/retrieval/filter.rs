//! Relevance, length and near-duplicate filtering.

use std::collections::HashSet;

use super::SearchHit;

/// Minimum trimmed passage length, in characters.
pub const MIN_TEXT_CHARS: usize = 10;
/// Word-Jaccard similarity above which a hit is a near duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.9;

/// Filters hits, preserving their order.
///
/// Drops hits below `threshold` (on the combined score when present),
/// hits whose trimmed text is shorter than [`MIN_TEXT_CHARS`], and hits
/// that are near duplicates of an earlier kept hit. Deduplication is
/// greedy: the first occurrence wins.
#[must_use]
pub fn filter_hits(hits: Vec<SearchHit>, threshold: f32) -> Vec<SearchHit> {
    let mut kept: Vec<SearchHit> = Vec::with_capacity(hits.len());
    let mut kept_words: Vec<HashSet<String>> = Vec::new();

    for hit in hits {
        if hit.effective_score() < threshold {
            continue;
        }
        if hit.text.trim().chars().count() < MIN_TEXT_CHARS {
            continue;
        }
        let words = word_set(&hit.text);
        if kept_words
            .iter()
            .any(|seen| jaccard(seen, &words) > DUPLICATE_THRESHOLD)
        {
            continue;
        }
        kept_words.push(words);
        kept.push(hit);
    }
    kept
}

/// Lowercased whitespace-separated words.
#[must_use]
pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of two word sets; `0.0` when both are empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hit(id: &str, text: &str, score: f32) -> SearchHit {
        SearchHit::new(id, text, score, "faq")
    }

    #[test]
    fn test_threshold_uses_combined_score() {
        let mut reranked = hit("a", "a passage long enough", 0.9);
        reranked.combined_score = Some(0.5);
        let kept = filter_hits(vec![reranked, hit("b", "another long passage", 0.8)], 0.7);
        let ids: Vec<&str> = kept.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_short_text_dropped() {
        let kept = filter_hits(vec![hit("a", "   short   ", 0.95)], 0.7);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_duplicates_first_wins() {
        let kept = filter_hits(
            vec![
                hit("a", "refund within seven days of delivery", 0.9),
                hit("b", "Refund within seven days of DELIVERY", 0.95),
                hit("c", "membership points expire yearly", 0.8),
            ],
            0.7,
        );
        let ids: Vec<&str> = kept.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_jaccard() {
        let a = word_set("a b c d");
        let b = word_set("a b c e");
        assert!((jaccard(&a, &b) - 0.6).abs() < 1e-9);
        assert!(jaccard(&HashSet::new(), &HashSet::new()).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_filtered_hits_hold_invariants(
            entries in prop::collection::vec(("[a-d ]{0,30}", 0.0f32..1.0), 0..20),
            threshold in 0.0f32..1.0,
        ) {
            let hits: Vec<SearchHit> = entries
                .iter()
                .enumerate()
                .map(|(i, (text, score))| hit(&i.to_string(), text, *score))
                .collect();
            let kept = filter_hits(hits, threshold);

            for h in &kept {
                prop_assert!(h.effective_score() >= threshold);
                prop_assert!(h.text.trim().chars().count() >= MIN_TEXT_CHARS);
            }
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    prop_assert!(jaccard(&word_set(&a.text), &word_set(&b.text)) <= DUPLICATE_THRESHOLD);
                }
            }
            // order preserved
            let ids: Vec<usize> = kept.iter().filter_map(|h| h.id.parse().ok()).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
