//! Process-wide owner of the connection, session and credential registries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::connection::{ConnectParams, Connection, ConnectionInfo, ConnectionRegistry};
use crate::credential::{CredentialStore, CredentialSummary};
use crate::execution::{CommandExecutor, ExecOutput, RemoteCommand};
use crate::session::{ShellOptions, ShellSession, ShellSessionInfo, ShellSessionManager, TypingPacer};
use crate::transfer::{CopyRequest, Endpoint, FileTransfer};
use crate::transport::{FileEntry, RemoteShell};
use crate::Result;

/// Counts of what `shutdown` closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub sessions: usize,
    pub connections: usize,
}

/// Entry point for every operation.
pub struct SessionHub {
    connections: Arc<ConnectionRegistry>,
    sessions: ShellSessionManager,
    credentials: CredentialStore,
    executor: CommandExecutor,
    transfer: FileTransfer,
}

impl SessionHub {
    pub fn new(transport: Arc<dyn RemoteShell>) -> Self {
        Self::with_typing(transport, TypingPacer::default())
    }

    /// Build a hub whose typed input uses `typing`.
    pub fn with_typing(transport: Arc<dyn RemoteShell>, typing: TypingPacer) -> Self {
        let connections = Arc::new(ConnectionRegistry::new(transport));
        Self {
            sessions: ShellSessionManager::new(Arc::clone(&connections)).with_typing(typing),
            credentials: CredentialStore::new(),
            executor: CommandExecutor::new(Arc::clone(&connections)),
            transfer: FileTransfer::new(Arc::clone(&connections)),
            connections,
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn sessions(&self) -> &ShellSessionManager {
        &self.sessions
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    // Connections

    pub async fn connect(&self, id: &str, params: ConnectParams) -> Result<Arc<Connection>> {
        self.connections.open(id, params).await
    }

    /// Close a connection. Shells opened on it become inactive.
    pub async fn disconnect(&self, id: &str) -> Result<()> {
        self.connections.close(id).await?;
        if let Err(e) = self.sessions.detach_orphans().await {
            warn!("Error detaching shells of {}: {}", id, e);
        }
        Ok(())
    }

    pub fn list_connections(&self) -> Result<Vec<ConnectionInfo>> {
        self.connections.list()
    }

    pub async fn execute(&self, connection_id: &str, command: &RemoteCommand) -> Result<ExecOutput> {
        self.executor.execute(connection_id, command).await
    }

    pub async fn set_working_directory(&self, connection_id: &str, path: &str) -> Result<String> {
        self.connections.set_working_directory(connection_id, path).await
    }

    pub async fn working_directory(&self, connection_id: &str) -> Result<String> {
        self.connections.working_directory(connection_id).await
    }

    // Files

    pub async fn copy(&self, request: &CopyRequest) -> Result<()> {
        self.transfer.copy(request).await
    }

    pub async fn list(&self, endpoint: &Endpoint, path: &str) -> Result<Vec<FileEntry>> {
        self.transfer.list(endpoint, path).await
    }

    pub async fn info(&self, endpoint: &Endpoint, path: &str) -> Result<FileEntry> {
        self.transfer.info(endpoint, path).await
    }

    // Shells

    pub async fn start_shell(
        &self,
        session_id: &str,
        connection_id: &str,
        options: ShellOptions,
    ) -> Result<Arc<ShellSession>> {
        self.sessions.start(session_id, connection_id, options).await
    }

    pub async fn send_input(&self, session_id: &str, text: &str, simulate_typing: bool) -> Result<()> {
        self.sessions.send_input(session_id, text, simulate_typing).await
    }

    pub async fn read_output(&self, session_id: &str, timeout: Duration, clear: bool) -> Result<String> {
        self.sessions.read_output(session_id, timeout, clear).await
    }

    pub async fn close_shell(&self, session_id: &str) -> Result<()> {
        self.sessions.close(session_id).await
    }

    pub fn list_sessions(&self) -> Result<Vec<ShellSessionInfo>> {
        self.sessions.list()
    }

    // Credentials

    pub fn save_credential(&self, id: &str, params: ConnectParams) -> Result<CredentialSummary> {
        self.credentials.save(id, params)
    }

    pub fn list_credentials(&self) -> Result<Vec<CredentialSummary>> {
        self.credentials.list()
    }

    pub fn delete_credential(&self, id: &str) -> Result<()> {
        self.credentials.delete(id)
    }

    /// Open `connection_id` using the stored credential `credential_id`.
    pub async fn connect_using(&self, credential_id: &str, connection_id: &str) -> Result<Arc<Connection>> {
        self.credentials
            .connect_using(credential_id, connection_id, &self.connections)
            .await
    }

    /// Close every session, then every connection.
    ///
    /// Closing a session wakes reads still waiting on it. Individual failures
    /// are logged and do not stop the rest. Calling it again closes whatever
    /// was opened since.
    pub async fn shutdown(&self) -> ShutdownReport {
        info!("Shutting down session hub");

        let sessions = self.sessions.close_all().await.unwrap_or_else(|e| {
            warn!("Error closing shell sessions: {}", e);
            0
        });
        let connections = self.connections.close_all().await.unwrap_or_else(|e| {
            warn!("Error closing connections: {}", e);
            0
        });

        info!(
            "Closed {} shell session(s) and {} connection(s)",
            sessions, connections
        );
        ShutdownReport {
            sessions,
            connections,
        }
    }
}
