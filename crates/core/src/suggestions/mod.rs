//! Suggestion Pattern Engine domain logic
//!
//! Mines cutting-list line items into reusable
//! `product + size -> profile + measurement + quantity` patterns, scores them
//! with a deterministic confidence heuristic, and ranks them for
//! autocomplete-style retrieval. Everything in this module is pure; storage
//! and scheduling live in `cutplan-db` and `cutplan-engine`.

pub mod extract;
pub mod keys;
pub mod rank;
pub mod scoring;
mod types;

pub use extract::{fold_history, FoldOutcome};
pub use types::*;

/// Placeholder profile name when a line item has no profile.
pub const UNKNOWN_PROFILE: &str = "UNKNOWN";

/// Maximum points the frequency term contributes to confidence.
pub const FREQUENCY_WEIGHT: f64 = 40.0;

/// Maximum points the recency term contributes to confidence.
pub const RECENCY_WEIGHT: f64 = 30.0;

/// Maximum points the context-diversity term contributes to confidence.
pub const CONTEXT_WEIGHT: f64 = 30.0;

/// Exponential decay constant for the recency term, in days.
pub const RECENCY_DECAY_DAYS: f64 = 90.0;

/// Points granted per distinct context, up to `CONTEXT_WEIGHT`.
pub const CONTEXT_SCORE_STEP: f64 = 10.0;

/// Patterns written per store batch during a full re-seed.
pub const BATCH_WRITE_SIZE: usize = 100;

/// Default retention window for the sweeper, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 180;

/// Default number of suggestions returned when the caller gives no limit.
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;
