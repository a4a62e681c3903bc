//! Partition store and caching strategies.
//!
//! - Named, versioned partitions of request -> response snapshots
//! - Cache-first for static assets, network-first for everything else
//! - Offline fallbacks when both network and cache come up empty

mod key;
mod storage;
mod strategy;

pub use key::{CachedResponse, RequestKey};
pub use storage::{PartitionHandle, PartitionStore, SqlitePartitions};
pub use strategy::{Served, ServedFrom, StrategyEngine};
