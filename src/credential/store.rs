//! In-memory credential cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::connection::{AuthMethod, ConnectParams, Connection, ConnectionRegistry};
use crate::error::{EntityKind, HubError};
use crate::Result;

/// Stored connection parameters.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub created_at: DateTime<Utc>,
    /// Time of the most recent connect using this credential.
    pub last_used: Option<DateTime<Utc>>,
}

impl Credential {
    /// Parameters for opening a connection with this credential.
    pub fn connect_params(&self) -> Result<ConnectParams> {
        ConnectParams::new(
            self.host.clone(),
            self.port,
            self.username.clone(),
            self.auth.clone(),
        )
    }

    /// Listing view with secrets reduced to flags.
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            has_password: self.auth.has_password(),
            has_private_key: self.auth.has_private_key(),
            created_at: self.created_at,
            last_used: self.last_used,
        }
    }
}

/// Credential listing entry. Carries no secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSummary {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub has_password: bool,
    pub has_private_key: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

/// Thread-safe storage for credentials.
pub struct CredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
        }
    }

    /// Store `params` under `id`.
    pub fn save(&self, id: &str, params: ConnectParams) -> Result<CredentialSummary> {
        // Re-run construction checks on fields a caller may have edited.
        let params = ConnectParams::new(params.host, params.port, params.username, params.auth)?;

        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| HubError::LockPoisoned)?;
        if credentials.contains_key(id) {
            return Err(HubError::already_exists(EntityKind::Credential, id));
        }

        let credential = Credential {
            id: id.to_string(),
            host: params.host,
            port: params.port,
            username: params.username,
            auth: params.auth,
            created_at: Utc::now(),
            last_used: None,
        };
        let summary = credential.summary();
        credentials.insert(id.to_string(), credential);

        info!("Credential {} saved for {}@{}", id, summary.username, summary.host);
        Ok(summary)
    }

    /// Get a copy of the credential, secrets included.
    pub fn load(&self, id: &str) -> Result<Credential> {
        let credentials = self
            .credentials
            .read()
            .map_err(|_| HubError::LockPoisoned)?;
        credentials
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::not_found(EntityKind::Credential, id))
    }

    /// Masked snapshot of all credentials, sorted by id.
    pub fn list(&self) -> Result<Vec<CredentialSummary>> {
        let credentials = self
            .credentials
            .read()
            .map_err(|_| HubError::LockPoisoned)?;
        let mut summaries: Vec<_> = credentials.values().map(Credential::summary).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| HubError::LockPoisoned)?;
        credentials
            .remove(id)
            .map(|_| info!("Credential {} deleted", id))
            .ok_or_else(|| HubError::not_found(EntityKind::Credential, id))
    }

    pub fn count(&self) -> usize {
        self.credentials.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Open `connection_id` with the stored credential and stamp its
    /// `last_used` time on success.
    pub async fn connect_using(
        &self,
        credential_id: &str,
        connection_id: &str,
        connections: &ConnectionRegistry,
    ) -> Result<Arc<Connection>> {
        let params = self.load(credential_id)?.connect_params()?;
        let connection = connections.open(connection_id, params).await?;

        // The credential may have been deleted while connecting.
        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| HubError::LockPoisoned)?;
        match credentials.get_mut(credential_id) {
            Some(credential) => credential.last_used = Some(Utc::now()),
            None => debug!("Credential {} deleted during connect", credential_id),
        }

        Ok(connection)
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
