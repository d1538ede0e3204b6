//! Core engine: level tables + listing snapshot → margins → ranked queries.

pub mod cache;
pub mod levels;
pub mod listings;
pub mod margins;
pub mod query;
pub mod service;

pub use levels::LevelTableCache;
pub use listings::{ListingSnapshot, ListingSnapshotCache};
pub use margins::MarginDeriver;
pub use query::{rank, ProfitQuery};
pub use service::{ProfitService, ServiceStatus};
