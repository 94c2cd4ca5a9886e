//! Distributed Cache Adapters
//!
//! Infrastructure implementations of the snapshot cache contract.

mod redis_cache;

pub use redis_cache::*;
