//! API request and response types.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionInfo;
use crate::credential::CredentialSummary;
use crate::error::HubError;
use crate::execution::ExecOutput;
use crate::session::{ShellSessionInfo, ShellState};
use crate::transport::FileEntry;

fn default_true() -> bool {
    true
}

/// Authentication fields shared by connect and save-credential requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthFields {
    #[serde(default)]
    pub password: Option<String>,
    /// Path to a private key on the hub's host.
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

/// Request to open a connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    pub connection_id: String,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(flatten)]
    pub auth: AuthFields,
}

/// Request to store a credential.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveCredentialRequest {
    pub credential_id: String,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(flatten)]
    pub auth: AuthFields,
}

/// Request to connect using a stored credential.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConnectRequest {
    pub connection_id: String,
}

/// Plain confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionListResponse {
    pub count: usize,
    pub connections: Vec<ConnectionInfo>,
}

/// Request to execute a command.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    /// Working directory for this command only.
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Response for command execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl From<ExecOutput> for ExecuteResponse {
    fn from(output: ExecOutput) -> Self {
        Self {
            success: output.success(),
            exit_code: output.exit_code,
            duration_ms: u64::try_from(output.duration.as_millis()).unwrap_or(u64::MAX),
            timed_out: output.timed_out,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetCwdRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CwdResponse {
    pub connection_id: String,
    pub cwd: String,
}

/// Request to copy a file. `source`/`target` are connection ids or `"local"`.
#[derive(Debug, Clone, Deserialize)]
pub struct CopyFileRequest {
    pub source: String,
    pub source_path: String,
    pub target: String,
    pub target_path: String,
    #[serde(default = "default_true")]
    pub create_dirs: bool,
}

/// Request to list a directory or stat a path.
#[derive(Debug, Clone, Deserialize)]
pub struct PathRequest {
    /// Connection id or `"local"`.
    pub endpoint: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListFilesResponse {
    pub path: String,
    pub count: usize,
    pub entries: Vec<FileEntry>,
}

/// Request to start an interactive shell.
#[derive(Debug, Clone, Deserialize)]
pub struct StartShellRequest {
    pub session_id: String,
    pub connection_id: String,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub cols: Option<u16>,
    #[serde(default)]
    pub rows: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendInputRequest {
    pub input: String,
    #[serde(default)]
    pub simulate_typing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadOutputRequest {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub clear_buffer: bool,
}

impl Default for ReadOutputRequest {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            clear_buffer: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadOutputResponse {
    pub session_id: String,
    pub state: ShellState,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub count: usize,
    pub sessions: Vec<ShellSessionInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialListResponse {
    pub count: usize,
    pub credentials: Vec<CredentialSummary>,
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&HubError> for ErrorResponse {
    fn from(e: &HubError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntityKind;

    #[test]
    fn test_connect_request_flattened_auth() {
        let req: ConnectRequest = serde_json::from_str(
            r#"{"connection_id":"web","host":"h","username":"u","password":"p"}"#,
        )
        .unwrap();
        assert_eq!(req.auth.password.as_deref(), Some("p"));
        assert!(req.port.is_none());
        assert!(req.auth.private_key.is_none());
    }

    #[test]
    fn test_copy_request_defaults() {
        let req: CopyFileRequest = serde_json::from_str(
            r#"{"source":"local","source_path":"/a","target":"web","target_path":"/b"}"#,
        )
        .unwrap();
        assert!(req.create_dirs);
    }

    #[test]
    fn test_read_output_defaults() {
        let req: ReadOutputRequest = serde_json::from_str("{}").unwrap();
        assert!(req.clear_buffer);
        assert!(req.timeout_ms.is_none());
    }

    #[test]
    fn test_execute_response_from_output() {
        let response = ExecuteResponse::from(ExecOutput::new(2, "out", "err"));
        assert!(!response.success);
        assert_eq!(response.exit_code, Some(2));
        assert_eq!(response.stderr, "err");
    }

    #[test]
    fn test_error_response_from_hub_error() {
        let err = HubError::not_found(EntityKind::Session, "s1");
        let body = ErrorResponse::from(&err);
        assert_eq!(body.code, "NOT_FOUND");
        assert!(body.message.contains("s1"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
