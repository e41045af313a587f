//! Live connection registry.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ConnectParams, ConnectionContext};
use crate::error::{EntityKind, HubError};
use crate::execution::StateProbe;
use crate::registry::Registry;
use crate::transport::{RemoteConnection, RemoteShell};
use crate::Result;

/// A registered, authenticated connection.
pub struct Connection {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    handle: Arc<dyn RemoteConnection>,
    context: Mutex<ConnectionContext>,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    /// The transport handle.
    pub fn handle(&self) -> &Arc<dyn RemoteConnection> {
        &self.handle
    }

    /// Lock the working-directory context.
    pub fn context(&self) -> Result<MutexGuard<'_, ConnectionContext>> {
        self.context.lock().map_err(|_| HubError::LockPoisoned)
    }

    /// Point-in-time summary.
    pub fn info(&self) -> Result<ConnectionInfo> {
        let context = self.context()?;
        Ok(ConnectionInfo {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            cwd: context.cwd().map(str::to_string),
            execution_count: context.execution_count(),
            last_command: context.last_command().map(str::to_string),
            last_exit_code: context.last_exit_code(),
            connected_at: self.connected_at,
        })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Serializable connection summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub execution_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    pub connected_at: DateTime<Utc>,
}

/// Owns every live connection, keyed by caller-chosen id.
pub struct ConnectionRegistry {
    transport: Arc<dyn RemoteShell>,
    connections: Registry<Connection>,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn RemoteShell>) -> Self {
        Self {
            transport,
            connections: Registry::new(EntityKind::Connection),
        }
    }

    /// Connect and register under `id`.
    ///
    /// The id stays reserved while the transport connects, so a concurrent
    /// open of the same id fails with `AlreadyExists` instead of racing.
    pub async fn open(&self, id: &str, params: ConnectParams) -> Result<Arc<Connection>> {
        let reservation = self.connections.reserve(id)?;

        debug!("Connecting {} to {}", id, params.target());
        let handle = self.transport.connect(&params).await.map_err(|e| match e {
            HubError::ConnectionFailed(_) => e,
            other => HubError::ConnectionFailed(other.to_string()),
        })?;

        let connection = reservation.commit(Connection {
            id: id.to_string(),
            host: params.host.clone(),
            port: params.port,
            username: params.username.clone(),
            handle,
            context: Mutex::new(ConnectionContext::new()),
            connected_at: Utc::now(),
        })?;

        info!("Connection {} opened to {}", id, params.target());
        Ok(connection)
    }

    /// Remove `id` and release its transport.
    ///
    /// The entry is gone before teardown starts; disconnect errors are logged
    /// and swallowed.
    pub async fn close(&self, id: &str) -> Result<()> {
        let connection = self.connections.remove(id)?;
        release(&connection).await;
        info!("Connection {} closed", id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<Connection>> {
        self.connections.get(id)
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        self.connections.contains(id)
    }

    /// Verify `path` is an enterable remote directory, then cache it.
    ///
    /// The cached value is the absolute path the remote side reports, so a
    /// relative `path` resolves against the account's default directory.
    pub async fn set_working_directory(&self, id: &str, path: &str) -> Result<String> {
        let connection = self.get(id)?;
        let probe = StateProbe::enter_dir_command(path)?;
        let output = connection.handle().exec(&probe).await?;

        if !output.success() {
            return Err(HubError::InvalidParams(format!(
                "directory does not exist or is not accessible: {}",
                path
            )));
        }

        let resolved = StateProbe::parse_cwd(&output.stdout).unwrap_or_else(|| path.to_string());
        connection.context()?.set_cwd(resolved.clone());
        debug!("Connection {} working directory set to {}", id, resolved);
        Ok(resolved)
    }

    /// Cached working directory, querying the remote default on first use.
    pub async fn working_directory(&self, id: &str) -> Result<String> {
        let connection = self.get(id)?;
        let cached = connection.context()?.cwd().map(str::to_string);
        if let Some(cwd) = cached {
            return Ok(cwd);
        }

        let output = connection.handle().exec(&StateProbe::cwd_command()).await?;
        let cwd = StateProbe::parse_cwd(&output.stdout)
            .filter(|_| output.success())
            .ok_or_else(|| {
                HubError::OperationFailed(format!(
                    "cannot determine working directory: {}",
                    output.stderr.trim()
                ))
            })?;

        // A concurrent set may have landed while we were waiting; keep it.
        let mut context = connection.context()?;
        match context.cwd() {
            Some(existing) => Ok(existing.to_string()),
            None => {
                context.set_cwd(cwd.clone());
                Ok(cwd)
            }
        }
    }

    /// Summaries of every connection, sorted by id.
    pub fn list(&self) -> Result<Vec<ConnectionInfo>> {
        self.connections
            .snapshot()?
            .into_iter()
            .map(|(_, connection)| connection.info())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.connections.count()
    }

    /// Close every connection, best-effort. Returns how many were closed.
    pub async fn close_all(&self) -> Result<usize> {
        let drained = self.connections.drain()?;
        let count = drained.len();
        for (id, connection) in drained {
            release(&connection).await;
            info!("Connection {} closed", id);
        }
        Ok(count)
    }
}

async fn release(connection: &Connection) {
    if let Err(e) = connection.handle().disconnect().await {
        warn!("Error disconnecting {}: {}", connection.id, e);
    }
}
