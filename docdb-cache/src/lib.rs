//! Read-through document cache for the Amazon Advertising APIs.
//!
//! [`CachedAdsApi`] wraps any [`amazon_ads::AdsApi`] and keeps a copy of every
//! entity it sees in a [`store::DocumentStore`]. List queries are rewritten
//! into store filters by [`query::QueryRewriter`] so most reads never reach
//! the vendor.

pub mod cached;
pub mod config;
pub mod filter;
pub mod metrics_defs;
pub mod negative_cache;
pub mod query;
pub mod store;

pub use cached::CachedAdsApi;
pub use query::{DateRange, QueryError};
pub use store::{DocumentStore, MemoryStore, MongoStore, StoreError};
