use std::sync::Arc;

use bson::doc;
use bson::Document;
use tracing::info;

use crate::scenario::crud::Fixture;
use crate::utils::scoped_timer::ScopedTimer;
use crate::ClusterHandle;
use crate::CommandError;
use crate::Namespace;
use crate::Result;
use crate::VerificationError;

/// Sharding administration through a router handle.
///
/// Commands are sent once; a refusal fails the scenario.
pub struct ShardingController {
    router: Arc<dyn ClusterHandle>,
}

impl ShardingController {
    pub fn new(router: Arc<dyn ClusterHandle>) -> Self {
        Self { router }
    }

    /// `{_id: "hashed"}`
    pub fn hashed_id_key() -> Document {
        doc! { "_id": "hashed" }
    }

    pub async fn enable_sharding(
        &self,
        database: &str,
    ) -> Result<()> {
        self.router
            .run_command("admin", doc! { "enableSharding": database })
            .await?;
        info!(%database, "sharding enabled");
        Ok(())
    }

    pub async fn shard_collection(
        &self,
        namespace: &Namespace,
        key: Document,
    ) -> Result<()> {
        self.router
            .run_command(
                "admin",
                doc! { "shardCollection": namespace.to_string(), "key": key.clone() },
            )
            .await?;
        info!(%namespace, ?key, "collection sharded");
        Ok(())
    }

    /// Number of shards registered with the cluster
    pub async fn shard_count(&self) -> Result<usize> {
        let reply = self
            .router
            .run_command("admin", doc! { "listShards": 1 })
            .await?;
        let shards = reply.get_array("shards").map_err(|e| CommandError::InvalidReply {
            command: "listShards".to_string(),
            reason: e.to_string(),
        })?;
        Ok(shards.len())
    }

    /// Inserts `count` documents named `<prefix><i>` through `handle` and
    /// returns the total the router then reports for the collection
    pub async fn bulk_insert(
        &self,
        handle: &dyn ClusterHandle,
        namespace: &Namespace,
        prefix: &str,
        count: usize,
    ) -> Result<u64> {
        let _timer = ScopedTimer::new("sharding::bulk_insert");

        let documents: Vec<Document> = (0..count)
            .map(|i| Fixture::new(format!("{prefix}{i}")).document())
            .collect();
        let inserted = handle.insert_many(namespace, documents).await?;
        if inserted != count {
            return Err(VerificationError::new("bulk insert is complete", count, inserted).into());
        }

        let total = handle.count(namespace, doc! {}).await?;
        info!(%namespace, inserted, total, "bulk insert done");
        Ok(total)
    }

    /// One shard's local view must not hold every document
    pub async fn verify_distribution(
        &self,
        shard_local: &dyn ClusterHandle,
        namespace: &Namespace,
        total: u64,
    ) -> Result<u64> {
        let local = shard_local.count(namespace, doc! {}).await?;
        info!(%namespace, local, total, "shard local count");

        if local == total {
            return Err(VerificationError::new(
                "documents are spread over several shards",
                format!("fewer than {total} on one shard"),
                local,
            )
            .into());
        }
        Ok(local)
    }
}
