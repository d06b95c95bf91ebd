//! Confidence scoring
//!
//! A deterministic, explainable heuristic blending three bounded terms:
//! frequency (0-40), recency (0-30), and context diversity (0-30). No model
//! training, no statistics crates — the score exists to rank suggestions and
//! to be explainable to an operator.

use chrono::{DateTime, Utc};

use super::types::Pattern;
use super::{CONTEXT_SCORE_STEP, CONTEXT_WEIGHT, FREQUENCY_WEIGHT, RECENCY_DECAY_DAYS, RECENCY_WEIGHT};

/// Frequency term: how often this pattern was observed relative to the most
/// observed pattern in the corpus.
///
/// `corpus_max_frequency` may be stale during online updates (it is refreshed
/// by batch extraction and the retention sweep); the clamp keeps the term
/// inside its 40-point budget even when the pattern overtakes a stale max.
pub fn frequency_score(frequency: u64, corpus_max_frequency: u64) -> f64 {
    let max = corpus_max_frequency.max(1) as f64;
    (FREQUENCY_WEIGHT * frequency as f64 / max).min(FREQUENCY_WEIGHT)
}

/// Recency term: exponential decay with a 90-day constant. A pattern used
/// today scores near 30; one unused for 90 days scores about 11.
pub fn recency_score(last_used: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days_since = (now - last_used).num_seconds().max(0) as f64 / 86_400.0;
    RECENCY_WEIGHT * (-days_since / RECENCY_DECAY_DAYS).exp()
}

/// Context term: 10 points per distinct product/size context, capped at 30.
pub fn context_score(context_count: usize) -> f64 {
    (CONTEXT_SCORE_STEP * context_count as f64).min(CONTEXT_WEIGHT)
}

/// Total confidence in `[0, 100]`, rounded to two decimal places. Each term
/// is bounded, so the sum never needs clamping.
pub fn confidence(
    frequency: u64,
    last_used: DateTime<Utc>,
    context_count: usize,
    corpus_max_frequency: u64,
    now: DateTime<Utc>,
) -> f64 {
    let total = frequency_score(frequency, corpus_max_frequency)
        + recency_score(last_used, now)
        + context_score(context_count);
    (total * 100.0).round() / 100.0
}

/// Recompute a pattern's stored confidence after a write to `frequency`,
/// `contexts`, or `last_used`.
pub fn rescore(pattern: &mut Pattern, corpus_max_frequency: u64, now: DateTime<Utc>) {
    pattern.confidence = confidence(
        pattern.frequency,
        pattern.last_used,
        pattern.contexts.len(),
        corpus_max_frequency,
        now,
    );
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn confidence_stays_within_bounds() {
        let now = Utc::now();
        for frequency in [0u64, 1, 7, 50, 10_000] {
            for days in [0i64, 1, 90, 400, 5_000] {
                for contexts in [0usize, 1, 3, 40] {
                    let score =
                        confidence(frequency, now - Duration::days(days), contexts, 50, now);
                    assert!((0.0..=100.0).contains(&score), "score {score} out of range");
                }
            }
        }
    }

    #[test]
    fn confidence_is_monotone_in_frequency() {
        let now = Utc::now();
        let last_used = now - Duration::days(10);
        let mut previous = 0.0;
        for frequency in 1..=20 {
            let score = confidence(frequency, last_used, 1, 20, now);
            assert!(score >= previous, "frequency {frequency} lowered the score");
            previous = score;
        }
    }

    #[test]
    fn confidence_never_increases_with_staleness() {
        let now = Utc::now();
        let mut previous = f64::MAX;
        for days in [0i64, 10, 45, 90, 180, 365] {
            let score = confidence(5, now - Duration::days(days), 1, 10, now);
            assert!(score <= previous, "{days} days stale raised the score");
            previous = score;
        }
    }

    #[test]
    fn recency_decays_to_roughly_a_third_after_ninety_days() {
        let now = Utc::now();
        let fresh = recency_score(now, now);
        let stale = recency_score(now - Duration::days(90), now);
        assert!(fresh > 29.9);
        assert!((stale - 30.0 * (-1.0f64).exp()).abs() < 0.05);
    }

    #[test]
    fn context_term_caps_at_three_contexts() {
        assert_eq!(context_score(0), 0.0);
        assert_eq!(context_score(2), 20.0);
        assert_eq!(context_score(3), 30.0);
        assert_eq!(context_score(12), 30.0);
    }

    #[test]
    fn frequency_term_clamps_against_stale_corpus_max() {
        // A stale corpus max smaller than the pattern's own frequency must
        // not push the term past its budget.
        assert_eq!(frequency_score(80, 40), 40.0);
        assert_eq!(frequency_score(10, 40), 10.0);
        assert_eq!(frequency_score(0, 0), 0.0);
    }

    #[test]
    fn confidence_rounds_to_two_decimals() {
        let now = Utc::now();
        let score = confidence(1, now - Duration::days(7), 1, 3, now);
        assert!((score * 100.0 - (score * 100.0).round()).abs() < 1e-9);
    }
}
