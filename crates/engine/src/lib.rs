//! Orchestration layer between the pure suggestion algorithms in
//! `cutplan-core` and the repositories in `cutplan-db`: batch extraction,
//! online learning, ranked queries, and the retention sweep.

pub mod corpus;
pub mod extractor;
pub mod learner;
pub mod query;
pub mod sweeper;

pub use corpus::CorpusStats;
pub use extractor::{BatchExtractor, ExtractionReport};
pub use learner::{spawn_learner, LearnerHandle, OnlineLearner};
pub use query::SuggestionService;
pub use sweeper::{RetentionSweeper, SweepReport};

use cutplan_core::errors::ApplicationError;
use cutplan_db::repositories::RepositoryError;

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
