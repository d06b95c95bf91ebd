pub mod cache;
pub mod connection;
pub mod migrations;
pub mod repositories;

pub use cache::CachedPatternRepository;
pub use connection::{connect, connect_with_settings, DbPool};
