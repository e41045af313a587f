//! REST API handlers.
//!
//! Every handler validates its request fields first, so a malformed request
//! never reaches the hub.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::types::{
    AuthFields, ConnectRequest, ConnectionListResponse, CopyFileRequest, CredentialConnectRequest,
    CredentialListResponse, CwdResponse, ErrorResponse, ExecuteRequest, ExecuteResponse, ListFilesResponse,
    MessageResponse, PathRequest, ReadOutputRequest, ReadOutputResponse, SaveCredentialRequest,
    SendInputRequest, SessionListResponse, SetCwdRequest, StartShellRequest,
};
use crate::connection::{AuthMethod, ConnectParams, ConnectionInfo, DEFAULT_PORT};
use crate::credential::CredentialSummary;
use crate::execution::RemoteCommand;
use crate::hub::SessionHub;
use crate::security::RequestValidator;
use crate::session::{ShellOptions, ShellSessionInfo, DEFAULT_COLS, DEFAULT_READ_TIMEOUT, DEFAULT_ROWS};
use crate::transfer::{CopyRequest, Endpoint};
use crate::transport::FileEntry;
use crate::Result;

/// Defaults applied to omitted request fields.
#[derive(Debug, Clone)]
pub struct ApiDefaults {
    pub ssh_port: u16,
    pub connect_timeout: Option<Duration>,
    pub cols: u16,
    pub rows: u16,
    pub read_timeout: Duration,
}

impl Default for ApiDefaults {
    fn default() -> Self {
        Self {
            ssh_port: DEFAULT_PORT,
            connect_timeout: None,
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SessionHub>,
    pub validator: Arc<RequestValidator>,
    pub defaults: Arc<ApiDefaults>,
}

impl AppState {
    pub fn new(hub: Arc<SessionHub>) -> Self {
        Self {
            hub,
            validator: Arc::new(RequestValidator::default()),
            defaults: Arc::new(ApiDefaults::default()),
        }
    }

    pub fn with_defaults(mut self, defaults: ApiDefaults) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    /// Validate connection fields and build parameters.
    fn connect_params(
        &self,
        host: String,
        port: Option<u16>,
        username: String,
        auth: AuthFields,
    ) -> Result<ConnectParams> {
        let port = port.unwrap_or(self.defaults.ssh_port);
        self.validator.validate_host(&host)?;
        self.validator.validate_port(port)?;
        if let Some(key) = &auth.private_key {
            self.validator
                .validate_path("private_key", &key.to_string_lossy())?;
        }

        let auth = AuthMethod::from_parts(auth.password, auth.private_key, auth.passphrase)?;
        let mut params = ConnectParams::new(host, port, username, auth)?;
        if let Some(timeout) = self.defaults.connect_timeout {
            params = params.with_connect_timeout(timeout);
        }
        Ok(params)
    }

    fn endpoint(&self, field: &'static str, name: &str) -> Result<Endpoint> {
        self.validator.validate_id(field, name)?;
        Ok(Endpoint::parse(name))
    }
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "ssh-session-hub",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "connections": state.hub.connections().count(),
        "sessions": state.hub.sessions().count(),
        "credentials": state.hub.credentials().count(),
    }))
}

// Connections

pub async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<(StatusCode, Json<ConnectionInfo>)> {
    state.validator.validate_id("connection_id", &req.connection_id)?;
    let params = state.connect_params(req.host, req.port, req.username, req.auth)?;

    let connection = state.hub.connect(&req.connection_id, params).await?;
    Ok((StatusCode::CREATED, Json(connection.info()?)))
}

pub async fn list_connections(State(state): State<AppState>) -> Result<Json<ConnectionListResponse>> {
    let connections = state.hub.list_connections()?;
    Ok(Json(ConnectionListResponse {
        count: connections.len(),
        connections,
    }))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.validator.validate_id("connection_id", &id)?;
    state.hub.disconnect(&id).await?;
    Ok(Json(MessageResponse::new(format!("disconnected {}", id))))
}

pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>> {
    state.validator.validate_id("connection_id", &id)?;
    state.validator.validate_command(&req.command)?;

    let mut command = RemoteCommand::new(req.command);
    if let Some(cwd) = req.cwd {
        state.validator.validate_path("cwd", &cwd)?;
        command = command.working_dir(cwd);
    }
    if let Some(ms) = req.timeout_ms {
        command = command.timeout(Duration::from_millis(ms.max(1)));
    }

    let output = state.hub.execute(&id, &command).await?;
    Ok(Json(ExecuteResponse::from(output)))
}

pub async fn get_cwd(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CwdResponse>> {
    state.validator.validate_id("connection_id", &id)?;
    let cwd = state.hub.working_directory(&id).await?;
    Ok(Json(CwdResponse {
        connection_id: id,
        cwd,
    }))
}

pub async fn set_cwd(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetCwdRequest>,
) -> Result<Json<CwdResponse>> {
    state.validator.validate_id("connection_id", &id)?;
    state.validator.validate_path("path", &req.path)?;
    let cwd = state.hub.set_working_directory(&id, &req.path).await?;
    Ok(Json(CwdResponse {
        connection_id: id,
        cwd,
    }))
}

// Files

pub async fn copy_file(
    State(state): State<AppState>,
    Json(req): Json<CopyFileRequest>,
) -> Result<Json<MessageResponse>> {
    let source = state.endpoint("source", &req.source)?;
    let target = state.endpoint("target", &req.target)?;
    state.validator.validate_path("source_path", &req.source_path)?;
    state.validator.validate_path("target_path", &req.target_path)?;

    let request = CopyRequest::new(source, req.source_path, target, req.target_path)
        .create_dirs(req.create_dirs);
    state.hub.copy(&request).await?;

    Ok(Json(MessageResponse::new(format!(
        "copied {}:{} to {}:{}",
        request.source, request.source_path, request.target, request.target_path
    ))))
}

pub async fn list_files(
    State(state): State<AppState>,
    Json(req): Json<PathRequest>,
) -> Result<Json<ListFilesResponse>> {
    let endpoint = state.endpoint("endpoint", &req.endpoint)?;
    state.validator.validate_path("path", &req.path)?;

    let entries = state.hub.list(&endpoint, &req.path).await?;
    Ok(Json(ListFilesResponse {
        path: req.path,
        count: entries.len(),
        entries,
    }))
}

pub async fn file_info(
    State(state): State<AppState>,
    Json(req): Json<PathRequest>,
) -> Result<Json<FileEntry>> {
    let endpoint = state.endpoint("endpoint", &req.endpoint)?;
    state.validator.validate_path("path", &req.path)?;
    Ok(Json(state.hub.info(&endpoint, &req.path).await?))
}

// Shells

pub async fn start_shell(
    State(state): State<AppState>,
    Json(req): Json<StartShellRequest>,
) -> Result<(StatusCode, Json<ShellSessionInfo>)> {
    state.validator.validate_id("session_id", &req.session_id)?;
    state.validator.validate_id("connection_id", &req.connection_id)?;

    let options = ShellOptions {
        shell: req.shell.filter(|s| !s.is_empty() && s != "default"),
        cols: req.cols.unwrap_or(state.defaults.cols),
        rows: req.rows.unwrap_or(state.defaults.rows),
    };
    state.validator.validate_dimensions(options.cols, options.rows)?;
    if let Some(shell) = &options.shell {
        state.validator.validate_command(shell)?;
    }

    let session = state
        .hub
        .start_shell(&req.session_id, &req.connection_id, options)
        .await?;
    Ok((StatusCode::CREATED, Json(session.info()?)))
}

pub async fn list_shells(State(state): State<AppState>) -> Result<Json<SessionListResponse>> {
    let sessions = state.hub.list_sessions()?;
    Ok(Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    }))
}

pub async fn send_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendInputRequest>,
) -> Result<Json<MessageResponse>> {
    state.validator.validate_id("session_id", &id)?;
    state
        .hub
        .send_input(&id, &req.input, req.simulate_typing)
        .await?;
    Ok(Json(MessageResponse::new(format!(
        "sent {} bytes to {}",
        req.input.len(),
        id
    ))))
}

pub async fn read_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReadOutputRequest>>,
) -> Result<Json<ReadOutputResponse>> {
    state.validator.validate_id("session_id", &id)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let timeout = match req.timeout_ms {
        Some(ms) => state.validator.read_timeout(ms),
        None => state.defaults.read_timeout,
    };

    let sessions = state.hub.sessions();
    let session = sessions.get(&id)?;
    let output = sessions.read_from(&session, timeout, req.clear_buffer).await?;
    let session_state = session.state()?;
    Ok(Json(ReadOutputResponse {
        session_id: id,
        state: session_state,
        output,
    }))
}

pub async fn close_shell(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.validator.validate_id("session_id", &id)?;
    state.hub.close_shell(&id).await?;
    Ok(Json(MessageResponse::new(format!("closed {}", id))))
}

// Credentials

pub async fn save_credential(
    State(state): State<AppState>,
    Json(req): Json<SaveCredentialRequest>,
) -> Result<(StatusCode, Json<CredentialSummary>)> {
    state.validator.validate_id("credential_id", &req.credential_id)?;
    let params = state.connect_params(req.host, req.port, req.username, req.auth)?;
    let summary = state.hub.save_credential(&req.credential_id, params)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn list_credentials(State(state): State<AppState>) -> Result<Json<CredentialListResponse>> {
    let credentials = state.hub.list_credentials()?;
    Ok(Json(CredentialListResponse {
        count: credentials.len(),
        credentials,
    }))
}

pub async fn delete_credential(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.validator.validate_id("credential_id", &id)?;
    state.hub.delete_credential(&id)?;
    Ok(Json(MessageResponse::new(format!("deleted {}", id))))
}

pub async fn connect_with_credential(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CredentialConnectRequest>,
) -> Result<(StatusCode, Json<ConnectionInfo>)> {
    state.validator.validate_id("credential_id", &id)?;
    state.validator.validate_id("connection_id", &req.connection_id)?;
    let connection = state.hub.connect_using(&id, &req.connection_id).await?;
    Ok((StatusCode::CREATED, Json(connection.info()?)))
}

/// Fallback for unknown routes.
pub async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("NOT_FOUND", "unknown endpoint")),
    )
}
