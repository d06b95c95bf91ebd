pub mod config;
pub mod domain;
pub mod errors;
pub mod suggestions;

pub use domain::cutting_list::{CuttingList, CuttingListId, CuttingListItem};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use suggestions::{
    EngineStatistics, LineItemObservation, Pattern, ProfileObservation, RatioObservation,
};
