//! Per-scenario users: upsert, removal, login and logout.

use std::sync::Arc;

use bson::doc;
use bson::Bson;
use tracing::debug;

use crate::ClusterEndpoint;
use crate::ClusterHandle;
use crate::CommandError;
use crate::Connector;
use crate::Credentials;
use crate::Error;
use crate::Result;
use crate::VerificationError;

/// Server code for a missing user
const USER_NOT_FOUND: i32 = 11;

/// Roles granted to scenario users on their own database
pub const SCENARIO_ROLES: [&str; 2] = ["readWrite", "dbAdmin"];

/// Creates the user, or resets its password and roles when it exists
pub async fn upsert_user(
    handle: &dyn ClusterHandle,
    database: &str,
    username: &str,
    password: &str,
    roles: &[&str],
) -> Result<Credentials> {
    let roles: Vec<Bson> = roles.iter().map(|r| Bson::from(*r)).collect();

    let update = doc! { "updateUser": username, "pwd": password, "roles": roles.clone() };
    match handle.run_command(database, update).await {
        Ok(_) => debug!(%database, %username, "user updated"),
        Err(Error::Command(CommandError::Rejected {
            code: USER_NOT_FOUND, ..
        })) => {
            let create = doc! { "createUser": username, "pwd": password, "roles": roles };
            handle.run_command(database, create).await?;
            debug!(%database, %username, "user created");
        }
        Err(e) => return Err(e),
    }

    Ok(Credentials::new(username, password, database))
}

pub async fn remove_user(
    handle: &dyn ClusterHandle,
    database: &str,
    username: &str,
) -> Result<()> {
    handle
        .run_command(database, doc! { "dropUser": username })
        .await?;
    debug!(%database, %username, "user removed");
    Ok(())
}

pub async fn user_exists(
    handle: &dyn ClusterHandle,
    database: &str,
    username: &str,
) -> Result<bool> {
    let reply = handle
        .run_command(database, doc! { "usersInfo": username })
        .await?;
    let users = reply.get_array("users").map_err(|e| CommandError::InvalidReply {
        command: "usersInfo".to_string(),
        reason: e.to_string(),
    })?;
    Ok(!users.is_empty())
}

/// Fails when `username` is still registered on `database`
pub async fn ensure_removed(
    handle: &dyn ClusterHandle,
    database: &str,
    username: &str,
) -> Result<()> {
    if user_exists(handle, database, username).await? {
        return Err(VerificationError::new("scenario user is removed", false, true).into());
    }
    Ok(())
}

/// Opens a handle authenticated as `credentials` on the same deployment
pub async fn login(
    connector: &dyn Connector,
    endpoint: &ClusterEndpoint,
    credentials: &Credentials,
) -> Result<Arc<dyn ClusterHandle>> {
    connector
        .connect(&endpoint.with_credentials(credentials.clone()))
        .await
}

pub async fn logout(handle: Arc<dyn ClusterHandle>) {
    handle.close().await;
}
