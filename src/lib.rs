//! Black-box acceptance harness for deployed MongoDB clusters.
//!
//! The suites connect to a running deployment, deliberately shut down the
//! primary of a replica set and check the cluster converges back: a new
//! primary is elected, acknowledged writes survive, the killed member
//! rejoins as a secondary and sharded data stays reachable through the
//! routers.
//!
//! ```ignore
//! let config = AcceptanceConfig::load()?.validate()?;
//! let ctx = ScenarioContext::new(config, Arc::new(MongoConnector));
//! let report = run_suites(SuiteKind::All, &ctx).await;
//! ```

mod client;
mod config;
mod errors;
pub mod convergence;
pub mod failure;
pub mod scenario;
pub mod topology;
pub(crate) mod utils;

pub use client::*;
pub use self::config::*;
pub use errors::*;
pub use scenario::run_suites;
pub use scenario::ScenarioContext;
pub use scenario::Suite;
pub use scenario::SuiteKind;
