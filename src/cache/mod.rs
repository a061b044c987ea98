//! Generic fetch cache shared by every view.
//!
//! This module is domain-agnostic. It provides:
//! - One entry per key holding the last good value plus its status
//! - Request coalescing: at most one outstanding fetch per key
//! - Generation stamps so a superseded fetch never overwrites newer state
//! - Batch invalidation with a single round of subscriber notifications
//! - Subscriptions with liveness checks for view binding

mod binding;
mod layer;
mod storage;
mod traits;

pub use binding::Subscription;
pub use layer::FetchCache;
pub use storage::Fetcher;
pub use traits::{CacheEntry, CacheKey, CacheValue, EntryStatus};
