//! Property-based supplement to the worked examples in
//! `canonicalize_tests.rs` (spec §8, `SPEC_FULL.md` §8): generated
//! path/query strings checked for idempotence and unreserved-character
//! preservation, rather than only the hand-picked shapes.

use proptest::prelude::*;
use zim_rewrite::{canonicalize, FuzzyRuleSet};

/// ASCII path-segment-safe strings: letters, digits, `-`, `_`, `.`, `~`,
/// and `/` as a separator, plus a literal `+` to exercise the query-only
/// space-folding rule.
fn path_like() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.~+-]{1,12}(/[a-zA-Z0-9_.~+-]{1,12}){0,4}"
}

proptest! {
    #[test]
    fn canonicalization_is_idempotent(segment in path_like()) {
        let rules = FuzzyRuleSet::empty();
        let url = format!("https://example.com/{segment}");
        if let Ok(once) = canonicalize(&url, &rules) {
            let materialized = format!("https://{}", once.as_str());
            let twice = canonicalize(&materialized, &rules).unwrap();
            prop_assert_eq!(once.as_str(), twice.as_str());
        }
    }

    #[test]
    fn unreserved_characters_never_appear_percent_encoded(segment in path_like()) {
        let rules = FuzzyRuleSet::empty();
        let url = format!("https://example.com/{segment}");
        if let Ok(path) = canonicalize(&url, &rules) {
            prop_assert!(!path.as_str().contains("%2D"));
            prop_assert!(!path.as_str().contains("%5F"));
            prop_assert!(!path.as_str().contains("%2E"));
            prop_assert!(!path.as_str().contains("%7E"));
        }
    }

    #[test]
    fn repeated_slashes_always_collapse(a in path_like(), b in path_like()) {
        let rules = FuzzyRuleSet::empty();
        let url = format!("https://example.com/{a}//{b}");
        if let Ok(path) = canonicalize(&url, &rules) {
            prop_assert!(!path.as_str().contains("//"));
        }
    }

    #[test]
    fn query_plus_folds_to_space_but_path_plus_survives_literal(segment in path_like()) {
        let rules = FuzzyRuleSet::empty();
        let url = format!("https://example.com/a+b?{segment}");
        if let Ok(path) = canonicalize(&url, &rules) {
            let (_, rest) = path.host_and_rest();
            let (path_part, query_part) = rest.split_once('?').unwrap_or((rest, ""));
            prop_assert!(path_part.contains('+'), "path + must survive: {path_part}");
            prop_assert!(!query_part.contains('+'), "query + must fold to space: {query_part}");
        }
    }
}
