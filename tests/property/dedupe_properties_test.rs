//! Property-based tests for suggestion validation.
//!
//! Whatever the vendor returns, validated suggestions are unique by
//! normalized name, sorted by confidence, bounded in count and confidence,
//! and carry an `is_new` flag computed from the existing tag set.

use std::collections::HashSet;

use proptest::prelude::*;
use tmarks::services::tag_recommender::{dedupe_and_sort, normalize_tag, validate_suggestions};
use tmarks::types::ai::TagSuggestion;

fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("rust".to_string()),
        Just("Rust".to_string()),
        Just(" web ".to_string()),
        Just("WEB".to_string()),
        Just("  ".to_string()),
        "[a-zA-Z]{1,6}",
    ]
}

fn arb_suggestion() -> impl Strategy<Value = TagSuggestion> {
    (arb_name(), any::<bool>(), -2.0f64..3.0).prop_map(|(name, is_new, confidence)| TagSuggestion {
        name,
        is_new,
        confidence,
    })
}

fn arb_existing() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_name(), 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_validated_names_are_unique_and_non_blank(
        suggestions in prop::collection::vec(arb_suggestion(), 0..20),
        existing in arb_existing(),
    ) {
        let result = validate_suggestions(suggestions, &existing, 0);

        let mut seen = HashSet::new();
        for s in &result {
            prop_assert!(!s.name.trim().is_empty());
            prop_assert!(seen.insert(normalize_tag(&s.name)), "duplicate {}", s.name);
        }
    }

    #[test]
    fn prop_is_new_matches_existing_set(
        suggestions in prop::collection::vec(arb_suggestion(), 0..20),
        existing in arb_existing(),
    ) {
        let known: HashSet<String> = existing.iter().map(|t| normalize_tag(t)).collect();
        for s in validate_suggestions(suggestions, &existing, 0) {
            prop_assert_eq!(s.is_new, !known.contains(&normalize_tag(&s.name)));
        }
    }

    #[test]
    fn prop_sorted_clamped_and_bounded(
        suggestions in prop::collection::vec(arb_suggestion(), 0..20),
        max_tags in 1usize..8,
    ) {
        let result = validate_suggestions(suggestions, &[], max_tags);

        prop_assert!(result.len() <= max_tags);
        prop_assert!(result.iter().all(|s| (0.0..=1.0).contains(&s.confidence)));
        prop_assert!(result.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn prop_dedupe_is_idempotent(suggestions in prop::collection::vec(arb_suggestion(), 0..20)) {
        let once = dedupe_and_sort(suggestions);
        let twice = dedupe_and_sort(once.clone());
        prop_assert_eq!(once, twice);
    }
}
