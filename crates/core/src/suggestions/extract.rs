//! Batch pattern extraction: pure fold of complete cutting-list history
//! into an aggregated pattern map.
//!
//! The fold is deterministic for a given history regardless of list order
//! within a timestamp — each list contributes independently and the map is
//! keyed by pattern key. I/O (loading history, clearing and rewriting the
//! store) belongs to `cutplan-engine`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::cutting_list::CuttingList;

use super::scoring;
use super::types::{Pattern, ProfileObservation};

/// Result of folding history: the aggregated patterns plus the count of
/// line items skipped for failing validation. Historical rows are outside
/// the caller's control, so a malformed item is skipped rather than failing
/// the whole run.
#[derive(Clone, Debug, Default)]
pub struct FoldOutcome {
    pub patterns: BTreeMap<String, Pattern>,
    pub skipped_items: u64,
}

/// Fold every `(product, size, profile, measurement)` tuple in the history
/// into the pattern map: frequency increments, running sums, ratio-history
/// appends, `last_used` max, and context/variation set unions.
pub fn fold_history(lists: &[CuttingList]) -> FoldOutcome {
    let mut outcome = FoldOutcome::default();

    for list in lists {
        for item in &list.items {
            let observation = ProfileObservation {
                product_name: list.product_name.clone(),
                size: list.size.clone(),
                profile: item.profile.clone(),
                measurement: item.measurement.clone(),
                quantity: item.quantity,
                order_quantity: list.order_quantity,
                observed_at: list.created_at,
            };

            let key = match observation.validate().and_then(|()| observation.pattern_key()) {
                Ok(key) => key,
                Err(_) => {
                    outcome.skipped_items += 1;
                    continue;
                }
            };

            let pattern = match outcome.patterns.entry(key) {
                std::collections::btree_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::btree_map::Entry::Vacant(entry) => {
                    // Seed cannot fail once the pattern key was built.
                    match Pattern::seed(&observation) {
                        Ok(seed) => entry.insert(seed),
                        Err(_) => {
                            outcome.skipped_items += 1;
                            continue;
                        }
                    }
                }
            };
            pattern.observe(&observation);
        }
    }

    outcome
}

/// Fully scored corpus ready for a store rewrite.
#[derive(Clone, Debug)]
pub struct ScoredCorpus {
    pub patterns: Vec<Pattern>,
    pub max_frequency: u64,
    pub skipped_items: u64,
}

/// Compute the corpus max frequency once over the folded map, then score
/// every pattern against it.
pub fn score_folded(outcome: FoldOutcome, now: DateTime<Utc>) -> ScoredCorpus {
    let max_frequency =
        outcome.patterns.values().map(|pattern| pattern.frequency).max().unwrap_or(0);

    let mut patterns: Vec<Pattern> = outcome.patterns.into_values().collect();
    for pattern in &mut patterns {
        scoring::rescore(pattern, max_frequency, now);
    }

    ScoredCorpus { patterns, max_frequency, skipped_items: outcome.skipped_items }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::cutting_list::{CuttingList, CuttingListId, CuttingListItem};

    use super::*;

    fn list(id: &str, product: &str, size: &str, order_quantity: i64) -> CuttingList {
        CuttingList {
            id: CuttingListId(id.to_string()),
            product_name: product.to_string(),
            size: size.to_string(),
            order_quantity,
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }

    fn item(profile: &str, measurement: &str, quantity: i64) -> CuttingListItem {
        CuttingListItem {
            profile: Some(profile.to_string()),
            measurement: measurement.to_string(),
            quantity,
        }
    }

    #[test]
    fn single_list_scenario_produces_expected_pattern() {
        let mut frame = list("L-1", "Frame", "200mm", 2);
        frame.items.push(item("A", "10mm", 4));

        let outcome = fold_history(&[frame]);
        assert_eq!(outcome.skipped_items, 0);

        let pattern = outcome.patterns.get("FRAME|200MM|A|10mm").expect("pattern");
        assert_eq!(pattern.frequency, 1);
        assert_eq!(pattern.ratio, 2.0);
        assert_eq!(pattern.contexts.iter().collect::<Vec<_>>(), vec!["FRAME|200MM"]);
    }

    #[test]
    fn extraction_is_idempotent_over_unchanged_history() {
        let mut first = list("L-1", "Frame", "200mm", 2);
        first.items.push(item("A", "10mm", 4));
        first.items.push(item("B", "25mm", 6));
        let mut second = list("L-2", "Frame", "200mm", 5);
        second.items.push(item("A", "10mm", 10));
        let history = vec![first, second];

        let now = Utc::now();
        let left = score_folded(fold_history(&history), now);
        let right = score_folded(fold_history(&history), now);

        assert_eq!(left.patterns, right.patterns);
        assert_eq!(left.max_frequency, right.max_frequency);
    }

    #[test]
    fn case_variants_of_the_same_tuple_merge() {
        let mut lower = list("L-1", "frame", "200mm", 2);
        lower.items.push(item("a", "10mm", 4));
        let mut upper = list("L-2", "FRAME", "200MM", 4);
        upper.items.push(item("A", "10mm", 8));

        let outcome = fold_history(&[lower, upper]);
        assert_eq!(outcome.patterns.len(), 1);
        let pattern = outcome.patterns.get("FRAME|200MM|A|10mm").expect("pattern");
        assert_eq!(pattern.frequency, 2);
        assert_eq!(pattern.total_quantity, 12);
    }

    #[test]
    fn last_used_is_the_max_observation_timestamp() {
        let now = Utc::now();
        let mut old = list("L-1", "Frame", "200mm", 2);
        old.created_at = now - Duration::days(60);
        old.items.push(item("A", "10mm", 4));
        let mut recent = list("L-2", "Frame", "200mm", 2);
        recent.created_at = now;
        recent.items.push(item("A", "10mm", 4));

        // Fold with the newer list first to prove max, not last-write.
        let outcome = fold_history(&[recent, old]);
        let pattern = outcome.patterns.get("FRAME|200MM|A|10mm").expect("pattern");
        assert_eq!(pattern.last_used, now);
    }

    #[test]
    fn invalid_items_are_skipped_and_counted() {
        let mut bad = list("L-1", "Frame", "200mm", 2);
        bad.items.push(CuttingListItem {
            profile: Some("A".to_string()),
            measurement: "  ".to_string(),
            quantity: 4,
        });
        bad.items.push(item("A", "10mm", 0));
        bad.items.push(item("A", "10mm", 4));

        let outcome = fold_history(&[bad]);
        assert_eq!(outcome.skipped_items, 2);
        assert_eq!(outcome.patterns.len(), 1);
    }

    #[test]
    fn scoring_uses_a_single_corpus_max() {
        let mut busy = list("L-1", "Frame", "200mm", 2);
        for _ in 0..4 {
            busy.items.push(item("A", "10mm", 4));
        }
        let mut quiet = list("L-2", "Door", "900mm", 1);
        quiet.items.push(item("B", "30mm", 2));

        let corpus = score_folded(fold_history(&[busy, quiet]), Utc::now());
        assert_eq!(corpus.max_frequency, 4);
        for pattern in &corpus.patterns {
            assert!((0.0..=100.0).contains(&pattern.confidence));
        }
    }
}
