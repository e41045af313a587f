//! Error types for ssh-session-hub.

use std::fmt;

use thiserror::Error;

/// The kind of registry entry an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Connection,
    Session,
    Credential,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => f.write_str("connection"),
            Self::Session => f.write_str("session"),
            Self::Credential => f.write_str("credential"),
        }
    }
}

/// Main error type for hub operations.
#[derive(Error, Debug)]
pub enum HubError {
    /// An entry with the given id is already registered.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },

    /// No entry with the given id is registered.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Missing or contradictory input.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The transport could not establish a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport or remote side failed an operation.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// The entry exists but is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl HubError {
    pub fn already_exists(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidParams(_) => "INVALID_PARAMS",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::OperationFailed(_) => "OPERATION_FAILED",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Io(_) => "IO_ERROR",
            Self::LockPoisoned => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code used when the error crosses the API boundary.
    pub fn status(&self) -> u16 {
        match self {
            Self::AlreadyExists { .. } | Self::InvalidState(_) => 409,
            Self::NotFound { .. } => 404,
            Self::InvalidParams(_) => 400,
            Self::ConnectionFailed(_) => 502,
            Self::OperationFailed(_) | Self::Io(_) | Self::LockPoisoned => 500,
        }
    }
}

/// Convenience Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
