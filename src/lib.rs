//! Feed reader client: a coalescing fetch cache, views bound to it, and a
//! synchronizer that keeps every resident view consistent after mutations.

pub mod api;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod query;
pub mod sync;
