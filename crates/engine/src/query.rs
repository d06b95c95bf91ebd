//! Read-side suggestion queries.
//!
//! Each query scopes its fetch at the store (full corpus, product prefix, or
//! exact context), then ranks in memory with the pure functions from
//! `cutplan-core`. A fetch that outruns the request timeout degrades to an
//! empty result with a warning; a store failure propagates.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use cutplan_core::errors::{ApplicationError, DomainError};
use cutplan_core::suggestions::{
    keys, rank, AppliedSuggestion, CombinationSuggestion, EngineStatistics, Pattern,
    ProductSuggestion, ProfileSuggestion, SizeSuggestion, DEFAULT_SUGGESTION_LIMIT,
};
use cutplan_db::repositories::{PatternRepository, RepositoryError};

use crate::persistence;

pub struct SuggestionService {
    patterns: Arc<dyn PatternRepository>,
    query_timeout: Duration,
}

impl SuggestionService {
    pub fn new(patterns: Arc<dyn PatternRepository>, query_timeout: Duration) -> Self {
        Self { patterns, query_timeout }
    }

    async fn fetch<F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<Vec<Pattern>, ApplicationError>
    where
        F: Future<Output = Result<Vec<Pattern>, RepositoryError>>,
    {
        match timeout(self.query_timeout, fut).await {
            Ok(Ok(patterns)) => Ok(patterns),
            Ok(Err(error)) => Err(persistence(error)),
            Err(_) => {
                warn!(
                    event_name = "suggestions.query.timeout",
                    operation,
                    timeout_secs = self.query_timeout.as_secs(),
                    "pattern fetch timed out, serving empty result"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Distinct product names matching a substring of the query.
    pub async fn products(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ProductSuggestion>, ApplicationError> {
        let patterns = self.fetch("products", self.patterns.list_all()).await?;
        Ok(rank::product_suggestions(
            &patterns,
            query,
            limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT),
        ))
    }

    /// Distinct sizes learned for one product.
    pub async fn sizes(
        &self,
        product: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SizeSuggestion>, ApplicationError> {
        let prefix = keys::context_prefix(product)?;
        let patterns = self.fetch("sizes", self.patterns.get_by_prefix(&prefix)).await?;
        Ok(rank::size_suggestions(&patterns, query, limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT)))
    }

    /// Profile/measurement candidates for one exact product/size context.
    pub async fn profiles(
        &self,
        product: &str,
        size: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ProfileSuggestion>, ApplicationError> {
        let context = keys::context_key(product, size)?;
        let patterns = self.fetch("profiles", self.patterns.get_by_context(&context)).await?;
        Ok(rank::profile_suggestions(&patterns, query, limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT)))
    }

    /// Full combinations for one context, for one-pick reconstruction.
    pub async fn combinations(
        &self,
        product: &str,
        size: &str,
        limit: Option<usize>,
    ) -> Result<Vec<CombinationSuggestion>, ApplicationError> {
        let context = keys::context_key(product, size)?;
        let patterns = self.fetch("combinations", self.patterns.get_by_context(&context)).await?;
        Ok(rank::combination_suggestions(&patterns, limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT)))
    }

    /// Build a complete line item for a context: the best pattern per
    /// profile, each with a quantity derived from the learned average ratio.
    /// An unknown context yields an empty entry list, not an error.
    pub async fn apply(
        &self,
        product: &str,
        size: &str,
        order_quantity: i64,
    ) -> Result<AppliedSuggestion, ApplicationError> {
        if order_quantity <= 0 {
            return Err(DomainError::NonPositiveQuantity {
                field: "order_quantity",
                value: order_quantity,
            }
            .into());
        }
        let context = keys::context_key(product, size)?;
        let patterns = self.fetch("apply", self.patterns.get_by_context(&context)).await?;

        Ok(AppliedSuggestion {
            product_name: keys::normalize(product),
            size: keys::normalize(size),
            order_quantity,
            entries: rank::apply_smart_suggestion(&patterns, order_quantity),
        })
    }

    /// Corpus-wide aggregates for the statistics endpoint.
    pub async fn statistics(&self) -> Result<EngineStatistics, ApplicationError> {
        let patterns = self.fetch("statistics", self.patterns.list_all()).await?;

        let pattern_count = patterns.len() as u64;
        let average_confidence = if patterns.is_empty() {
            0.0
        } else {
            let total: f64 = patterns.iter().map(|pattern| pattern.confidence).sum();
            ((total / patterns.len() as f64) * 100.0).round() / 100.0
        };

        let mut products = std::collections::HashSet::new();
        let mut contexts = std::collections::HashSet::new();
        for pattern in &patterns {
            products.insert(pattern.product_name.as_str());
            contexts.insert(pattern.context_key.as_str());
        }

        Ok(EngineStatistics {
            pattern_count,
            average_confidence,
            distinct_products: products.len() as u64,
            distinct_contexts: contexts.len() as u64,
            max_frequency: patterns.iter().map(|pattern| pattern.frequency).max().unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use cutplan_core::domain::cutting_list::CuttingListItem;
    use cutplan_core::errors::{ApplicationError, DomainError};
    use cutplan_core::suggestions::LineItemObservation;
    use cutplan_db::repositories::InMemoryPatternRepository;

    use super::SuggestionService;
    use crate::corpus::CorpusStats;
    use crate::learner::OnlineLearner;

    async fn seeded_service() -> SuggestionService {
        let patterns = Arc::new(InMemoryPatternRepository::default());
        let learner = OnlineLearner::new(
            patterns.clone(),
            Arc::new(CorpusStats::default()),
            Duration::from_secs(5),
        );

        let items = [
            ("Frame", "200mm", 2, "A", "10mm", 4),
            ("Frame", "200mm", 2, "B", "25mm", 6),
            ("Frame", "300mm", 1, "A", "10mm", 2),
            ("Door", "900mm", 1, "C", "30mm", 2),
        ];
        for (product, size, order_quantity, profile, measurement, quantity) in items {
            learner
                .learn(LineItemObservation {
                    product_name: product.to_string(),
                    size: size.to_string(),
                    order_quantity,
                    observed_at: Utc::now(),
                    entries: vec![CuttingListItem {
                        profile: Some(profile.to_string()),
                        measurement: measurement.to_string(),
                        quantity,
                    }],
                })
                .await
                .expect("seed corpus");
        }

        SuggestionService::new(patterns, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn products_dedupe_across_sizes() {
        let service = seeded_service().await;
        let products = service.products("fra", None).await.expect("products");
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].product_name, "FRAME");
    }

    #[tokio::test]
    async fn sizes_are_scoped_to_one_product() {
        let service = seeded_service().await;
        let sizes = service.sizes("frame", "", None).await.expect("sizes");
        let mut names: Vec<&str> = sizes.iter().map(|s| s.size.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["200MM", "300MM"]);
    }

    #[tokio::test]
    async fn profiles_are_scoped_to_the_exact_context() {
        let service = seeded_service().await;
        let profiles = service.profiles("frame", "200mm", "", None).await.expect("profiles");
        assert_eq!(profiles.len(), 2);
        assert!(profiles.iter().all(|p| p.profile == "A" || p.profile == "B"));

        let other = service.profiles("frame", "300mm", "", None).await.expect("profiles");
        assert_eq!(other.len(), 1);
    }

    #[tokio::test]
    async fn apply_builds_a_complete_line_item() {
        let service = seeded_service().await;
        let applied = service.apply("frame", "200mm", 4).await.expect("apply");

        assert_eq!(applied.product_name, "FRAME");
        assert_eq!(applied.order_quantity, 4);
        assert_eq!(applied.entries.len(), 2);
        let a = applied.entries.iter().find(|entry| entry.profile == "A").expect("profile A");
        // Learned ratio 4/2 = 2.0, so 4 ordered pieces need 8.
        assert_eq!(a.quantity, 8);
    }

    #[tokio::test]
    async fn apply_on_an_unknown_context_is_empty_not_an_error() {
        let service = seeded_service().await;
        let applied = service.apply("gate", "100mm", 3).await.expect("apply");
        assert!(applied.entries.is_empty());
    }

    #[tokio::test]
    async fn apply_rejects_non_positive_order_quantity() {
        let service = seeded_service().await;
        let result = service.apply("frame", "200mm", 0).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::NonPositiveQuantity {
                field: "order_quantity",
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn statistics_aggregate_the_whole_corpus() {
        let service = seeded_service().await;
        let stats = service.statistics().await.expect("statistics");

        assert_eq!(stats.pattern_count, 4);
        assert_eq!(stats.distinct_products, 2);
        assert_eq!(stats.distinct_contexts, 3);
        assert_eq!(stats.max_frequency, 1);
        assert!(stats.average_confidence > 0.0);
    }

    #[tokio::test]
    async fn blank_product_is_a_domain_error() {
        let service = seeded_service().await;
        let result = service.sizes("   ", "", None).await;
        assert!(matches!(result, Err(ApplicationError::Domain(_))));
    }
}
