//! Security for the API layer.
//!
//! - **API key authentication**: optional Bearer token check on `/api/v1`
//! - **Request validation**: ids, hosts, ports, paths, commands and terminal
//!   sizes are checked before any hub call

pub mod auth;
pub mod validation;

pub use auth::{auth_middleware, ApiKeyStore, AuthConfig};
pub use validation::{sanitize_for_display, RequestValidator, ValidationConfig, ValidationError};
