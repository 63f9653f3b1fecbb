//! Sharding scenarios
//!
//! Every scenario owns a freshly sharded database, hashed on `_id`, and a
//! user scoped to it. Failover scenarios reuse the convergence verifier on
//! either a shard's or the config servers' replica set.

mod controller;
mod suite;

pub use controller::*;
pub use suite::*;


pub const SHARD_COLLECTION: &str = "TestShardCollection";
