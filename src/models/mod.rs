//! Data models for coinwatch commands and services
//!
//! Each model represents either cached market data or alert bookkeeping
//! passed between the cache, the evaluator and the notifiers.

pub mod alert;
pub mod market;
pub mod price;

pub use alert::{AlertEvent, AlertMessage, AlertRule, AlertState, Direction};
pub use market::MarketRow;
pub use price::{CacheEntry, CachedPrice, Freshness, PriceData, QueryKey};
