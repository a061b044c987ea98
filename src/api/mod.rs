//! Feed store API: wire types, the remote store seam, the HTTP adapter and
//! the cached read path.

pub mod cache;
pub mod cached_client;
pub mod client;
#[cfg(test)]
pub mod memory;
pub mod store;
pub mod types;

pub use cached_client::{CachedClient, QueryCache};
pub use client::HttpStore;
pub use store::RemoteStore;
