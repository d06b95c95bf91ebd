//! Types for the Suggestion Pattern Engine

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::domain::cutting_list::CuttingListItem;
use crate::errors::DomainError;

use super::keys;

/// One entry of the append-only observation trail kept per pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioObservation {
    pub order_quantity: i64,
    pub profile_quantity: i64,
    pub ratio: f64,
}

/// `quantity / order_quantity`, guarded against division by zero.
pub fn observation_ratio(quantity: i64, order_quantity: i64) -> f64 {
    if order_quantity == 0 {
        1.0
    } else {
        quantity as f64 / order_quantity as f64
    }
}

/// The unit of learned knowledge: one `product + size -> profile +
/// measurement + quantity` association with its full observation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique composite key; the only allowed merge/upsert key.
    pub pattern_key: String,
    /// `PRODUCT|SIZE` grouping key.
    pub context_key: String,
    pub product_name: String,
    pub size: String,
    pub profile: String,
    pub measurement: String,
    /// Most recently observed profile-piece quantity (last-write).
    pub quantity: i64,
    /// Most recently observed order quantity (last-write).
    pub order_quantity: i64,
    /// `quantity / order_quantity` for the most recent observation.
    pub ratio: f64,
    /// Number of observations folded into this pattern. Only increases.
    pub frequency: u64,
    pub total_quantity: i64,
    pub total_order_quantity: i64,
    /// Every distinct context this profile/measurement combination was seen
    /// in. Insertion-ordered, never shrinks.
    pub contexts: IndexSet<String>,
    /// Alternate measurement strings seen under the same product/size/profile.
    pub variations: IndexSet<String>,
    /// Full observation trail, append-only.
    pub ratio_history: Vec<RatioObservation>,
    /// Max of all observation timestamps.
    pub last_used: DateTime<Utc>,
    /// Derived 0-100 score; recomputed on every write, never mutated alone.
    pub confidence: f64,
}

impl Pattern {
    /// Zero-value seed for a key that has never been observed. The first
    /// call to [`Pattern::observe`] turns it into a real pattern.
    pub fn seed(observation: &ProfileObservation) -> Result<Self, DomainError> {
        let pattern_key = observation.pattern_key()?;
        let context_key = observation.context_key()?;
        Ok(Self {
            pattern_key,
            context_key,
            product_name: keys::normalize(&observation.product_name),
            size: keys::normalize(&observation.size),
            profile: keys::normalize_profile(observation.profile.as_deref()),
            measurement: keys::normalize_measurement(&observation.measurement),
            quantity: 0,
            order_quantity: 0,
            ratio: 1.0,
            frequency: 0,
            total_quantity: 0,
            total_order_quantity: 0,
            contexts: IndexSet::new(),
            variations: IndexSet::new(),
            ratio_history: Vec::new(),
            last_used: observation.observed_at,
            confidence: 0.0,
        })
    }

    /// Fold one observation into this pattern: frequency and the running
    /// sums accumulate, the "current" fields are last-write, the history
    /// appends, and the context/variation sets union.
    ///
    /// Confidence is NOT recomputed here; callers rescore immediately after
    /// because the corpus max frequency is theirs to supply.
    pub fn observe(&mut self, observation: &ProfileObservation) {
        self.frequency += 1;
        self.total_quantity += observation.quantity;
        self.total_order_quantity += observation.order_quantity;
        self.quantity = observation.quantity;
        self.order_quantity = observation.order_quantity;
        self.ratio = observation_ratio(observation.quantity, observation.order_quantity);
        self.ratio_history.push(RatioObservation {
            order_quantity: observation.order_quantity,
            profile_quantity: observation.quantity,
            ratio: self.ratio,
        });
        if observation.observed_at > self.last_used {
            self.last_used = observation.observed_at;
        }
        if let Ok(context) = observation.context_key() {
            self.contexts.insert(context);
        }
        self.variations.insert(keys::normalize_measurement(&observation.measurement));
    }

    /// `total_quantity / frequency`.
    pub fn average_quantity(&self) -> f64 {
        if self.frequency == 0 {
            0.0
        } else {
            self.total_quantity as f64 / self.frequency as f64
        }
    }

    /// `total_quantity / total_order_quantity`, with the same division-by-
    /// zero guard as the per-observation ratio.
    pub fn average_ratio(&self) -> f64 {
        observation_ratio(self.total_quantity, self.total_order_quantity)
    }
}

/// One validated observation for a single pattern key.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileObservation {
    pub product_name: String,
    pub size: String,
    pub profile: Option<String>,
    pub measurement: String,
    pub quantity: i64,
    pub order_quantity: i64,
    pub observed_at: DateTime<Utc>,
}

impl ProfileObservation {
    pub fn pattern_key(&self) -> Result<String, DomainError> {
        keys::pattern_key(&self.product_name, &self.size, self.profile.as_deref(), &self.measurement)
    }

    pub fn context_key(&self) -> Result<String, DomainError> {
        keys::context_key(&self.product_name, &self.size)
    }

    /// Reject malformed observations before they reach the store.
    /// An order quantity of zero is tolerated (the ratio guard covers it);
    /// profile quantities must be positive.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.pattern_key()?;
        if self.quantity <= 0 {
            return Err(DomainError::NonPositiveQuantity {
                field: "quantity",
                value: self.quantity,
            });
        }
        if self.order_quantity < 0 {
            return Err(DomainError::NonPositiveQuantity {
                field: "order_quantity",
                value: self.order_quantity,
            });
        }
        Ok(())
    }
}

/// A freshly recorded line item, as handed to the online learner: one
/// product/size/order-quantity header with one or more profile entries.
#[derive(Clone, Debug, PartialEq)]
pub struct LineItemObservation {
    pub product_name: String,
    pub size: String,
    pub order_quantity: i64,
    pub observed_at: DateTime<Utc>,
    pub entries: Vec<CuttingListItem>,
}

impl LineItemObservation {
    /// Split into independent per-pattern observations. Entries are
    /// independent; a bad one fails validation on its own later.
    pub fn into_profile_observations(self) -> Vec<ProfileObservation> {
        let LineItemObservation { product_name, size, order_quantity, observed_at, entries } = self;
        entries
            .into_iter()
            .map(|entry| ProfileObservation {
                product_name: product_name.clone(),
                size: size.clone(),
                profile: entry.profile,
                measurement: entry.measurement,
                quantity: entry.quantity,
                order_quantity,
                observed_at,
            })
            .collect()
    }
}

/// A distinct product name, ranked by its best pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSuggestion {
    pub product_name: String,
    pub confidence: f64,
}

/// A distinct size under one product, ranked by its best pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeSuggestion {
    pub size: String,
    pub confidence: f64,
}

/// A profile/measurement candidate within one exact context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSuggestion {
    pub profile: String,
    pub measurement: String,
    pub confidence: f64,
    pub frequency: u64,
    pub last_used: DateTime<Utc>,
}

/// A full profile+measurement combination for one-pick reconstruction of a
/// multi-profile line item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinationSuggestion {
    pub profile: String,
    pub measurement: String,
    pub confidence: f64,
    pub average_ratio: f64,
}

/// One ready-to-insert profile entry produced by the apply operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedLineItem {
    pub profile: String,
    pub measurement: String,
    pub quantity: i64,
    pub confidence: f64,
}

/// The apply operation's result: a complete line item for the requested
/// context. `entries` is empty when nothing has been learned yet — a normal
/// outcome, not an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedSuggestion {
    pub product_name: String,
    pub size: String,
    pub order_quantity: i64,
    pub entries: Vec<SuggestedLineItem>,
}

/// Aggregate counts served by the statistics endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatistics {
    pub pattern_count: u64,
    pub average_confidence: f64,
    pub distinct_products: u64,
    pub distinct_contexts: u64,
    pub max_frequency: u64,
}
