//! Ranked retrieval over learned patterns.
//!
//! All functions here are pure over a slice of patterns the caller already
//! fetched; scoping (context, prefix) happens at the store. Ordering is
//! confidence-first with deterministic tie-breaks so repeated queries over
//! identical data return identical rankings.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::keys;
use super::types::{
    CombinationSuggestion, Pattern, ProductSuggestion, ProfileSuggestion, SizeSuggestion,
    SuggestedLineItem,
};

fn by_confidence(a: &Pattern, b: &Pattern) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.frequency.cmp(&a.frequency))
        .then_with(|| b.last_used.cmp(&a.last_used))
        .then_with(|| a.pattern_key.cmp(&b.pattern_key))
}

/// Highest-confidence pattern per group key, insertion order irrelevant.
fn best_per_group<'a, F>(patterns: &'a [Pattern], group: F) -> Vec<&'a Pattern>
where
    F: Fn(&'a Pattern) -> &'a str,
{
    let mut best: HashMap<&str, &Pattern> = HashMap::new();
    for pattern in patterns {
        match best.entry(group(pattern)) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                if by_confidence(pattern, entry.get()) == Ordering::Less {
                    entry.insert(pattern);
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(pattern);
            }
        }
    }
    let mut ranked: Vec<&Pattern> = best.into_values().collect();
    ranked.sort_by(|a, b| by_confidence(a, b));
    ranked
}

/// Distinct product names matching the query, ranked by each product's best
/// pattern.
pub fn product_suggestions(
    patterns: &[Pattern],
    query: &str,
    limit: usize,
) -> Vec<ProductSuggestion> {
    let needle = keys::normalize(query);
    let matching: Vec<Pattern> = patterns
        .iter()
        .filter(|pattern| needle.is_empty() || pattern.product_name.contains(&needle))
        .cloned()
        .collect();

    best_per_group(&matching, |pattern| pattern.product_name.as_str())
        .into_iter()
        .take(limit)
        .map(|pattern| ProductSuggestion {
            product_name: pattern.product_name.clone(),
            confidence: pattern.confidence,
        })
        .collect()
}

/// Distinct sizes for an already product-scoped pattern slice.
pub fn size_suggestions(patterns: &[Pattern], query: &str, limit: usize) -> Vec<SizeSuggestion> {
    let needle = keys::normalize(query);
    let matching: Vec<Pattern> = patterns
        .iter()
        .filter(|pattern| needle.is_empty() || pattern.size.contains(&needle))
        .cloned()
        .collect();

    best_per_group(&matching, |pattern| pattern.size.as_str())
        .into_iter()
        .take(limit)
        .map(|pattern| SizeSuggestion { size: pattern.size.clone(), confidence: pattern.confidence })
        .collect()
}

/// Profile/measurement candidates within one exact context, ranked by
/// confidence with frequency and recency tie-breaks.
pub fn profile_suggestions(
    patterns: &[Pattern],
    query: &str,
    limit: usize,
) -> Vec<ProfileSuggestion> {
    let needle = keys::normalize(query);
    let mut matching: Vec<&Pattern> = patterns
        .iter()
        .filter(|pattern| needle.is_empty() || pattern.profile.contains(&needle))
        .collect();
    matching.sort_by(|a, b| by_confidence(a, b));

    matching
        .into_iter()
        .take(limit)
        .map(|pattern| ProfileSuggestion {
            profile: pattern.profile.clone(),
            measurement: pattern.measurement.clone(),
            confidence: pattern.confidence,
            frequency: pattern.frequency,
            last_used: pattern.last_used,
        })
        .collect()
}

/// Full profile+measurement combinations for a context, highest confidence
/// first, for one-pick line-item reconstruction.
pub fn combination_suggestions(patterns: &[Pattern], limit: usize) -> Vec<CombinationSuggestion> {
    let mut ranked: Vec<&Pattern> = patterns.iter().collect();
    ranked.sort_by(|a, b| by_confidence(a, b));

    ranked
        .into_iter()
        .take(limit)
        .map(|pattern| CombinationSuggestion {
            profile: pattern.profile.clone(),
            measurement: pattern.measurement.clone(),
            confidence: pattern.confidence,
            average_ratio: pattern.average_ratio(),
        })
        .collect()
}

/// Derive the quantity for one applied pattern: the learned average ratio
/// scaled by the new order quantity, never below one piece.
pub fn suggested_quantity(pattern: &Pattern, order_quantity: i64) -> i64 {
    ((pattern.average_ratio() * order_quantity as f64).round() as i64).max(1)
}

/// The single best pattern per distinct profile, each with a derived
/// quantity — together a ready-to-insert multi-profile line item.
pub fn apply_smart_suggestion(patterns: &[Pattern], order_quantity: i64) -> Vec<SuggestedLineItem> {
    best_per_group(patterns, |pattern| pattern.profile.as_str())
        .into_iter()
        .map(|pattern| SuggestedLineItem {
            profile: pattern.profile.clone(),
            measurement: pattern.measurement.clone(),
            quantity: suggested_quantity(pattern, order_quantity),
            confidence: pattern.confidence,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use indexmap::IndexSet;

    use super::*;

    fn pattern(product: &str, size: &str, profile: &str, measurement: &str) -> Pattern {
        let context = format!("{product}|{size}");
        Pattern {
            pattern_key: format!("{context}|{profile}|{measurement}"),
            context_key: context.clone(),
            product_name: product.to_string(),
            size: size.to_string(),
            profile: profile.to_string(),
            measurement: measurement.to_string(),
            quantity: 4,
            order_quantity: 2,
            ratio: 2.0,
            frequency: 1,
            total_quantity: 4,
            total_order_quantity: 2,
            contexts: IndexSet::from([context]),
            variations: IndexSet::from([measurement.to_string()]),
            ratio_history: Vec::new(),
            last_used: Utc::now(),
            confidence: 50.0,
        }
    }

    #[test]
    fn product_suggestions_return_best_pattern_per_product() {
        let mut strong = pattern("FRAME", "200MM", "A", "10mm");
        strong.confidence = 80.0;
        let weak = pattern("FRAME", "300MM", "A", "10mm");
        let other = pattern("DOOR", "900MM", "B", "30mm");

        let ranked = product_suggestions(&[weak, strong, other], "fra", 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product_name, "FRAME");
        assert_eq!(ranked[0].confidence, 80.0);
    }

    #[test]
    fn size_suggestions_filter_by_substring_and_dedupe() {
        let a = pattern("FRAME", "200MM", "A", "10mm");
        let mut b = pattern("FRAME", "200MM", "B", "25mm");
        b.confidence = 70.0;
        let c = pattern("FRAME", "900MM", "A", "10mm");

        let ranked = size_suggestions(&[a, b, c], "200", 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].size, "200MM");
        assert_eq!(ranked[0].confidence, 70.0);
    }

    #[test]
    fn profile_ties_break_on_frequency_then_recency() {
        let now = Utc::now();
        let mut frequent = pattern("FRAME", "200MM", "A", "10mm");
        frequent.frequency = 9;
        frequent.last_used = now - Duration::days(30);
        let mut recent = pattern("FRAME", "200MM", "B", "25mm");
        recent.frequency = 9;
        recent.last_used = now;
        let mut rare = pattern("FRAME", "200MM", "C", "40mm");
        rare.frequency = 2;

        let ranked = profile_suggestions(&[rare, frequent, recent], "", 10);
        let order: Vec<&str> = ranked.iter().map(|s| s.profile.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }

    #[test]
    fn combination_suggestions_rank_by_confidence_and_honor_limit() {
        let mut high = pattern("FRAME", "200MM", "A", "10mm");
        high.confidence = 90.0;
        let mut mid = pattern("FRAME", "200MM", "B", "25mm");
        mid.confidence = 60.0;
        let low = pattern("FRAME", "200MM", "C", "40mm");

        let ranked = combination_suggestions(&[low, high, mid], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].profile, "A");
        assert_eq!(ranked[1].profile, "B");
    }

    #[test]
    fn apply_uses_average_ratio_and_clamps_to_one() {
        let mut halves = pattern("FRAME", "200MM", "A", "10mm");
        halves.total_quantity = 13;
        halves.total_order_quantity = 30;

        // 13/30 * 10 = 4.33 -> 4
        assert_eq!(suggested_quantity(&halves, 10), 4);
        // 13/30 * 1 = 0.43 -> rounds to 0, clamps to 1
        assert_eq!(suggested_quantity(&halves, 1), 1);
    }

    #[test]
    fn apply_picks_one_pattern_per_profile() {
        let mut preferred = pattern("FRAME", "200MM", "A", "10mm");
        preferred.confidence = 90.0;
        let rival = pattern("FRAME", "200MM", "A", "12mm");
        let other_profile = pattern("FRAME", "200MM", "B", "25mm");

        let entries = apply_smart_suggestion(&[rival, preferred, other_profile], 2);
        assert_eq!(entries.len(), 2);
        let a = entries.iter().find(|entry| entry.profile == "A").expect("profile A");
        assert_eq!(a.measurement, "10mm");
    }

    #[test]
    fn empty_pattern_slice_yields_empty_results() {
        assert!(product_suggestions(&[], "x", 5).is_empty());
        assert!(apply_smart_suggestion(&[], 10).is_empty());
    }
}
