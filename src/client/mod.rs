//! Cluster client adapter
//!
//! Wraps the driver behind two seams used by the rest of the crate:
//! - [`Connector`] - turns a [`ClusterEndpoint`] into a live handle
//! - [`ClusterHandle`] - command execution, consistency mode switching,
//!   live member discovery and the data operations used by the scenarios
//!
//! [`MongoConnector`] is the production implementation. The consistency mode
//! is a property of the handle, not of a connection: whoever relaxes it is
//! responsible for restoring [`ConsistencyMode::Strong`] before the handle is
//! used for write-path assertions again.

mod consistency;
mod driver_error;
mod endpoint;
mod mongo;

pub use consistency::*;
pub(crate) use driver_error::*;
pub use endpoint::*;
pub use mongo::*;

#[cfg(test)]
mod driver_error_test;
#[cfg(test)]
mod endpoint_test;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Database and collection pair a data operation targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    /// Seed addresses the handle was built from
    fn seeds(&self) -> Vec<String>;

    /// Runs an administrative command under the current consistency mode
    async fn run_command(
        &self,
        database: &str,
        command: Document,
    ) -> Result<Document>;

    fn consistency_mode(&self) -> ConsistencyMode;

    /// Switches the read routing of every subsequent operation.
    ///
    /// With `refresh` the underlying connections are discarded so the next
    /// operation re-runs server selection from scratch.
    fn set_consistency_mode(
        &self,
        mode: ConsistencyMode,
        refresh: bool,
    ) -> Result<()>;

    /// Members currently answering, named as the replica set config names them
    async fn list_live_members(&self) -> Result<BTreeSet<String>>;

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
    ) -> Result<()>;

    /// Returns the number of inserted documents
    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> Result<usize>;

    async fn count(
        &self,
        namespace: &Namespace,
        filter: Document,
    ) -> Result<u64>;

    /// Applies `$set` of `update` to every match, returns the matched count
    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
    ) -> Result<u64>;

    /// Returns the deleted count
    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Document,
    ) -> Result<u64>;

    async fn drop_collection(
        &self,
        namespace: &Namespace,
    ) -> Result<()>;

    async fn drop_database(
        &self,
        database: &str,
    ) -> Result<()>;

    async fn close(&self);
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a handle in [`ConsistencyMode::Strong`].
    ///
    /// Connection failures are never retried here.
    async fn connect(
        &self,
        endpoint: &ClusterEndpoint,
    ) -> Result<Arc<dyn ClusterHandle>>;
}
