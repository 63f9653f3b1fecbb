//! Topology Prober
//!
//! One `isMaster` round-trip per probe, decoded into [`IsMasterReply`] and
//! reduced to a [`TopologySnapshot`]. The prober never touches the handle's
//! consistency mode: under a relaxed mode consecutive probes may be answered
//! by different members, which is how a poll loop discovers a new primary
//! through the secondaries.


use std::fmt;

use bson::doc;
use bson::Document;
use serde::Deserialize;
use tracing::debug;

use crate::ClusterHandle;
use crate::CommandError;
use crate::Result;

pub const IS_MASTER: &str = "isMaster";
const ROUTER_MSG: &str = "isdbgrid";

/// Typed reply of the `isMaster` command.
///
/// Every field is optional on the wire; absent fields decode to their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IsMasterReply {
    #[serde(default, rename = "ismaster")]
    pub is_master: bool,
    #[serde(default)]
    pub secondary: bool,
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub me: Option<String>,
    #[serde(default, rename = "setName")]
    pub set_name: Option<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub passives: Vec<String>,
    #[serde(default)]
    pub arbiters: Vec<String>,
    #[serde(default)]
    pub msg: Option<String>,
    /// Set by a node started with a replica set name whose set was never
    /// initiated
    #[serde(default, rename = "isreplicaset")]
    pub is_replica_set: bool,
    #[serde(default)]
    pub ok: f64,
}

impl IsMasterReply {
    pub fn from_document(reply: Document) -> Result<Self> {
        bson::from_document(reply).map_err(|e| {
            CommandError::InvalidReply {
                command: IS_MASTER.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn kind(&self) -> TopologyKind {
        if self.msg.as_deref() == Some(ROUTER_MSG) {
            TopologyKind::Router
        } else if non_empty(&self.set_name).is_some() {
            TopologyKind::ReplicaSetMember
        } else if self.is_replica_set {
            TopologyKind::UninitializedReplicaSet
        } else {
            TopologyKind::Standalone
        }
    }

    /// Data-bearing members named by the replica set configuration
    pub fn members(&self) -> Vec<String> {
        self.hosts
            .iter()
            .chain(self.passives.iter())
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            is_primary: self.is_master,
            primary_id: non_empty(&self.primary),
            self_id: non_empty(&self.me),
            set_name: non_empty(&self.set_name),
            ok: self.ok == 1.0,
            kind: self.kind(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// What kind of node answered a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyKind {
    Standalone,
    /// Member of an initiated replica set, primary or not
    ReplicaSetMember,
    /// Started with a set name but `replSetInitiate` never ran
    UninitializedReplicaSet,
    /// mongos
    Router,
}

/// Point-in-time view of the cluster from the member that answered
#[derive(Debug, Clone, PartialEq)]
pub struct TopologySnapshot {
    pub is_primary: bool,
    pub primary_id: Option<String>,
    /// Absent on standalone nodes and routers
    pub self_id: Option<String>,
    pub set_name: Option<String>,
    pub ok: bool,
    pub kind: TopologyKind,
}

impl fmt::Display for TopologySnapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{{kind: {:?}, ok: {}, is_primary: {}, primary: {}, self: {}, set: {}}}",
            self.kind,
            self.ok,
            self.is_primary,
            self.primary_id.as_deref().unwrap_or("-"),
            self.self_id.as_deref().unwrap_or("-"),
            self.set_name.as_deref().unwrap_or("-"),
        )
    }
}

/// Runs `isMaster` under the handle's current consistency mode
pub async fn probe_reply(handle: &dyn ClusterHandle) -> Result<IsMasterReply> {
    let reply = handle.run_command("admin", doc! { "isMaster": 1 }).await?;
    IsMasterReply::from_document(reply)
}

pub async fn probe(handle: &dyn ClusterHandle) -> Result<TopologySnapshot> {
    let snapshot = probe_reply(handle).await?.snapshot();
    debug!(mode = %handle.consistency_mode(), %snapshot, "probe");
    Ok(snapshot)
}
