//! In-memory memoization for expensive remote lookups.
//!
//! This module provides a Harvest-agnostic cache that:
//! - Keys entries by namespace + accessor arguments
//! - Expires entries after a fixed duration or at a computed instant (e.g. midnight)
//! - Shares one in-flight computation between concurrent callers
//! - Never stores a failed computation

mod layer;
mod traits;

pub use layer::{CacheLayer, Memoized};
pub use traits::{Expiry, QueryKey};
