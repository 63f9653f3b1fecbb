//! CRUD Scenario Runner
//!
//! Single-shot data operations on one namespace, each followed by the count
//! assertion that makes it a check. Also the durability probe used around
//! failovers.

use std::sync::Arc;

use bson::doc;
use bson::oid::ObjectId;
use bson::Document;
use tracing::debug;

use crate::utils::scoped_timer::ScopedTimer;
use crate::ClusterHandle;
use crate::Namespace;
use crate::Result;
use crate::VerificationError;

/// The tracked unit of durability
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub id: ObjectId,
    pub name: String,
}

impl Fixture {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
        }
    }

    pub fn document(&self) -> Document {
        doc! { "_id": self.id, "Name": self.name.as_str() }
    }

    /// Field-equality query on the name
    pub fn by_value(&self) -> Document {
        doc! { "Name": self.name.as_str() }
    }

    pub fn by_id(&self) -> Document {
        doc! { "_id": self.id }
    }
}

/// How update and delete select the fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    ByValue,
    ById,
}

impl Lookup {
    fn filter(
        self,
        fixture: &Fixture,
    ) -> Document {
        match self {
            Lookup::ByValue => fixture.by_value(),
            Lookup::ById => fixture.by_id(),
        }
    }
}

pub struct CrudScenarioRunner {
    handle: Arc<dyn ClusterHandle>,
    namespace: Namespace,
}

impl CrudScenarioRunner {
    pub fn new(
        handle: Arc<dyn ClusterHandle>,
        namespace: Namespace,
    ) -> Self {
        Self { handle, namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub async fn insert(
        &self,
        fixture: &Fixture,
    ) -> Result<()> {
        debug!(namespace = %self.namespace, name = %fixture.name, "insert fixture");
        self.handle.insert_one(&self.namespace, fixture.document()).await
    }

    pub async fn count_matching(
        &self,
        filter: Document,
    ) -> Result<u64> {
        self.handle.count(&self.namespace, filter).await
    }

    pub async fn count_all(&self) -> Result<u64> {
        self.count_matching(doc! {}).await
    }

    /// Fails with a [`VerificationError`] unless exactly `expected` documents
    /// match
    pub async fn expect_count(
        &self,
        what: &str,
        filter: Document,
        expected: u64,
    ) -> Result<()> {
        let actual = self.count_matching(filter).await?;
        if actual != expected {
            return Err(VerificationError::new(what, expected, actual).into());
        }
        Ok(())
    }

    pub async fn insert_and_verify(
        &self,
        fixture: &Fixture,
    ) -> Result<()> {
        self.insert(fixture).await?;
        self.expect_count("inserted document is found", fixture.by_value(), 1)
            .await
    }

    /// Sets a new name on the fixture and returns the renamed fixture
    pub async fn rename(
        &self,
        fixture: &Fixture,
        lookup: Lookup,
        new_name: &str,
    ) -> Result<Fixture> {
        let matched = self
            .handle
            .update_many(&self.namespace, lookup.filter(fixture), doc! { "Name": new_name })
            .await?;
        if matched != 1 {
            return Err(VerificationError::new("update matches the document", 1u64, matched).into());
        }
        Ok(Fixture {
            id: fixture.id,
            name: new_name.to_string(),
        })
    }

    pub async fn delete(
        &self,
        fixture: &Fixture,
        lookup: Lookup,
    ) -> Result<u64> {
        self.handle
            .delete_many(&self.namespace, lookup.filter(fixture))
            .await
    }

    /// insert, find, update, find, delete, find(0)
    pub async fn run_full_cycle(
        &self,
        fixture: &Fixture,
        lookup: Lookup,
        new_name: &str,
    ) -> Result<()> {
        let _timer = ScopedTimer::new("crud::full_cycle");

        self.insert_and_verify(fixture).await?;

        let renamed = self.rename(fixture, lookup, new_name).await?;
        self.expect_count("updated document is found", renamed.by_value(), 1)
            .await?;

        self.delete(&renamed, lookup).await?;
        self.expect_count("deleted document is gone", renamed.by_value(), 0)
            .await
    }

    pub async fn drop_collection(&self) -> Result<()> {
        self.handle.drop_collection(&self.namespace).await
    }

    /// Drops the scenario's database and checks nothing is left behind
    pub async fn teardown(&self) -> Result<()> {
        self.handle.drop_database(&self.namespace.database).await?;
        self.expect_count("no residual documents", doc! {}, 0).await
    }
}
