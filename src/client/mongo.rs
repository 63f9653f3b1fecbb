//! Driver-backed [`Connector`] and [`ClusterHandle`].
//!
//! A handle owns one routed driver client, swapped atomically on refresh,
//! plus a cache of direct single-member clients used for liveness pings.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bson::doc;
use bson::Document;
use futures::future::join_all;
use mongodb::options::Acknowledgment;
use mongodb::options::ClientOptions;
use mongodb::options::CountOptions;
use mongodb::options::Credential;
use mongodb::options::Tls;
use mongodb::options::TlsOptions;
use mongodb::options::WriteConcern;
use mongodb::Client;
use mongodb::Collection;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::command_error;
use super::command_name;
use super::connect_error;
use super::ClusterEndpoint;
use super::ClusterHandle;
use super::ConsistencyMode;
use super::Connector;
use super::DriverFault;
use super::Namespace;
use crate::topology::probe_reply;
use crate::utils::net::parse_address;
use crate::Result;

const APP_NAME: &str = "mongo-acceptance";

/// Upper bound of a single liveness ping
pub const MEMBER_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens [`MongoClusterHandle`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(
        &self,
        endpoint: &ClusterEndpoint,
    ) -> Result<Arc<dyn ClusterHandle>> {
        let handle = MongoClusterHandle::open(endpoint.clone()).await?;
        Ok(Arc::new(handle))
    }
}

struct HandleInner {
    client: Client,
}

pub struct MongoClusterHandle {
    endpoint: ClusterEndpoint,
    mode: RwLock<ConsistencyMode>,
    inner: ArcSwap<HandleInner>,
    /// Direct clients keyed by member address
    pub(super) member_clients: Mutex<HashMap<String, Client>>,
}

impl MongoClusterHandle {
    /// Builds the driver client and checks reachability.
    ///
    /// With `fail_fast` every seed must answer a ping; otherwise one routed
    /// ping answered by any member is enough.
    pub async fn open(endpoint: ClusterEndpoint) -> Result<Self> {
        let handle = Self::unchecked(endpoint)?;

        if handle.endpoint.fail_fast() && !handle.endpoint.is_direct() {
            for address in handle.endpoint.addresses() {
                handle
                    .ping_member(address)
                    .await
                    .map_err(|fault| connect_error(address, fault))?;
            }
        } else {
            handle
                .ping_routed()
                .await
                .map_err(|fault| connect_error(&handle.endpoint.display_addresses(), fault))?;
        }

        info!(
            addresses = %handle.endpoint.display_addresses(),
            replica_set = ?handle.endpoint.replica_set(),
            direct = handle.endpoint.is_direct(),
            user = %handle.endpoint.credentials().username,
            "connected"
        );
        Ok(handle)
    }

    /// Builds the driver client without contacting any member
    pub(crate) fn unchecked(endpoint: ClusterEndpoint) -> Result<Self> {
        let mode = ConsistencyMode::Strong;
        let client = build_client(&endpoint, mode)?;
        Ok(Self {
            endpoint,
            mode: RwLock::new(mode),
            inner: ArcSwap::from_pointee(HandleInner { client }),
            member_clients: Mutex::new(HashMap::new()),
        })
    }

    fn client(&self) -> Client {
        self.inner.load().client.clone()
    }

    fn collection(
        &self,
        namespace: &Namespace,
    ) -> Collection<Document> {
        self.client()
            .database(&namespace.database)
            .collection(&namespace.collection)
    }

    fn command_failed(
        &self,
        command: &str,
        err: &mongodb::error::Error,
    ) -> crate::Error {
        command_error(command, &self.endpoint.display_addresses(), DriverFault::from(err))
    }

    async fn ping_routed(&self) -> std::result::Result<(), DriverFault> {
        self.client()
            .database("admin")
            .run_command(
                doc! { "ping": 1 },
                Some(ConsistencyMode::Eventual.selection_criteria()),
            )
            .await
            .map(|_| ())
            .map_err(|e| DriverFault::from(&e))
    }

    pub(crate) fn member_client(
        &self,
        address: &str,
    ) -> std::result::Result<Client, DriverFault> {
        let mut clients = self.member_clients.lock();
        if let Some(client) = clients.get(address) {
            return Ok(client.clone());
        }

        let endpoint = self.endpoint.direct_to(address);
        let mut options =
            client_options(&endpoint, ConsistencyMode::Eventual).map_err(|e| DriverFault::Other(e.to_string()))?;
        options.connect_timeout = Some(MEMBER_PING_TIMEOUT);
        options.server_selection_timeout = Some(MEMBER_PING_TIMEOUT);

        let client = Client::with_options(options).map_err(|e| DriverFault::from(&e))?;
        clients.insert(address.to_string(), client.clone());
        Ok(client)
    }

    pub(crate) async fn ping_member(
        &self,
        address: &str,
    ) -> std::result::Result<(), DriverFault> {
        let admin = self.member_client(address)?.database("admin");
        let ping = admin.run_command(doc! { "ping": 1 }, None);

        match tokio::time::timeout(MEMBER_PING_TIMEOUT, ping).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DriverFault::from(&e)),
            Err(_) => Err(DriverFault::ServerSelection(format!(
                "{address} did not answer within {MEMBER_PING_TIMEOUT:?}"
            ))),
        }
    }
}

#[async_trait]
impl ClusterHandle for MongoClusterHandle {
    fn seeds(&self) -> Vec<String> {
        self.endpoint.addresses().to_vec()
    }

    async fn run_command(
        &self,
        database: &str,
        command: Document,
    ) -> Result<Document> {
        let name = command_name(&command);
        let criteria = self.consistency_mode().selection_criteria();
        self.client()
            .database(database)
            .run_command(command, Some(criteria))
            .await
            .map_err(|e| self.command_failed(&name, &e))
    }

    fn consistency_mode(&self) -> ConsistencyMode {
        *self.mode.read()
    }

    fn set_consistency_mode(
        &self,
        mode: ConsistencyMode,
        refresh: bool,
    ) -> Result<()> {
        let previous = std::mem::replace(&mut *self.mode.write(), mode);

        if refresh {
            let client = build_client(&self.endpoint, mode)?;
            self.inner.store(Arc::new(HandleInner { client }));
            self.member_clients.lock().clear();
        }

        debug!(%previous, %mode, refresh, "consistency mode switched");
        Ok(())
    }

    async fn list_live_members(&self) -> Result<BTreeSet<String>> {
        let reply = probe_reply(self).await?;
        let mut candidates = reply.members();
        if candidates.is_empty() {
            candidates = self.endpoint.addresses().to_vec();
        }

        let pings = candidates.into_iter().map(|member| async move {
            let result = self.ping_member(&member).await;
            (member, result)
        });

        let mut live = BTreeSet::new();
        for (member, result) in join_all(pings).await {
            match result {
                Ok(()) => {
                    live.insert(member);
                }
                Err(fault) => debug!(%member, ?fault, "member not live"),
            }
        }
        Ok(live)
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
    ) -> Result<()> {
        self.collection(namespace)
            .insert_one(document, None)
            .await
            .map(|_| ())
            .map_err(|e| self.command_failed("insert", &e))
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> Result<usize> {
        self.collection(namespace)
            .insert_many(documents, None)
            .await
            .map(|r| r.inserted_ids.len())
            .map_err(|e| self.command_failed("insert", &e))
    }

    async fn count(
        &self,
        namespace: &Namespace,
        filter: Document,
    ) -> Result<u64> {
        let mut options = CountOptions::default();
        options.selection_criteria = Some(self.consistency_mode().selection_criteria());

        self.collection(namespace)
            .count_documents(filter, options)
            .await
            .map_err(|e| self.command_failed("count", &e))
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        self.collection(namespace)
            .update_many(filter, doc! { "$set": update }, None)
            .await
            .map(|r| r.matched_count)
            .map_err(|e| self.command_failed("update", &e))
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: Document,
    ) -> Result<u64> {
        self.collection(namespace)
            .delete_many(filter, None)
            .await
            .map(|r| r.deleted_count)
            .map_err(|e| self.command_failed("delete", &e))
    }

    async fn drop_collection(
        &self,
        namespace: &Namespace,
    ) -> Result<()> {
        self.collection(namespace)
            .drop(None)
            .await
            .map_err(|e| self.command_failed("drop", &e))
    }

    async fn drop_database(
        &self,
        database: &str,
    ) -> Result<()> {
        self.client()
            .database(database)
            .drop(None)
            .await
            .map_err(|e| self.command_failed("dropDatabase", &e))
    }

    async fn close(&self) {
        let members: Vec<Client> = self.member_clients.lock().drain().map(|(_, c)| c).collect();
        for client in members {
            client.shutdown().await;
        }
        self.client().shutdown().await;
        debug!(addresses = %self.endpoint.display_addresses(), "handle closed");
    }
}

fn build_client(
    endpoint: &ClusterEndpoint,
    mode: ConsistencyMode,
) -> Result<Client> {
    let options = client_options(endpoint, mode)?;
    Client::with_options(options).map_err(|e| {
        warn!(addresses = %endpoint.display_addresses(), "client construction failed: {}", e);
        connect_error(&endpoint.display_addresses(), DriverFault::from(&e))
    })
}

/// Driver options for an endpoint, reads routed per `mode`.
///
/// Writes are acknowledged by a journaled majority so a document confirmed
/// before a failover is one the oracle may expect to survive it.
pub(crate) fn client_options(
    endpoint: &ClusterEndpoint,
    mode: ConsistencyMode,
) -> Result<ClientOptions> {
    let hosts = endpoint
        .addresses()
        .iter()
        .map(|address| parse_address(address))
        .collect::<Result<Vec<_>>>()?;

    let mut options = ClientOptions::default();
    options.hosts = hosts;
    options.app_name = Some(APP_NAME.to_string());
    options.repl_set_name = endpoint.replica_set().map(str::to_string);
    options.direct_connection = Some(endpoint.is_direct());
    options.connect_timeout = Some(endpoint.connect_timeout());
    options.server_selection_timeout = Some(endpoint.connect_timeout());
    options.selection_criteria = Some(mode.selection_criteria());

    let mut write_concern = WriteConcern::default();
    write_concern.w = Some(Acknowledgment::Majority);
    write_concern.journal = Some(true);
    options.write_concern = Some(write_concern);

    let credentials = endpoint.credentials();
    if !credentials.is_anonymous() {
        let mut credential = Credential::default();
        credential.username = Some(credentials.username.clone());
        credential.password = Some(credentials.password.clone());
        credential.source = Some(credentials.source.clone());
        options.credential = Some(credential);
    }

    if endpoint.tls().enabled {
        let mut tls = TlsOptions::default();
        tls.ca_file_path = endpoint.tls().ca_path();
        options.tls = Some(Tls::Enabled(tls));
    }

    Ok(options)
}
