//! Data freshness subsystem.
//!
//! City registry, per-city reading cache with TTL, and the orchestrator
//! that refreshes it from the upstream feed.

pub mod cache;
pub mod refresh;
pub mod registry;

pub use cache::{FreshnessCache, RefreshClaim, WriteEffect};
pub use refresh::{RefreshMode, RefreshOptions, RefreshOrchestrator, RefreshReport};
pub use registry::CityRegistry;
