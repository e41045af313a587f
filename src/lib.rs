//! # ssh-session-hub
//!
//! Named SSH connections, one-shot remote commands, file transfer and
//! buffered interactive shells behind one in-process hub.
//!
//! ## Features
//!
//! - **Connection registry**: caller-chosen ids, one live connection each
//! - **Interactive shells**: output buffered between reads, reads bounded by a
//!   timeout, optional human-like typing
//! - **File transfer**: local and remote endpoints in any combination
//! - **Credentials**: in-memory store with masked listings
//! - **HTTP API**: JSON over axum, optional Bearer key
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ssh_session_hub::connection::ConnectParams;
//! use ssh_session_hub::execution::RemoteCommand;
//! use ssh_session_hub::session::ShellOptions;
//! use ssh_session_hub::transport::SshTransport;
//! use ssh_session_hub::SessionHub;
//!
//! #[tokio::main]
//! async fn main() -> ssh_session_hub::Result<()> {
//!     ssh_session_hub::logging::try_init().ok();
//!
//!     let hub = SessionHub::new(Arc::new(SshTransport::new()));
//!     let params = ConnectParams::password("10.0.0.5", "deploy", "hunter2")?;
//!     hub.connect("web", params).await?;
//!
//!     let output = hub.execute("web", &RemoteCommand::new("uptime")).await?;
//!     println!("{}", output.stdout);
//!
//!     hub.start_shell("s1", "web", ShellOptions::default()).await?;
//!     hub.send_input("s1", "ls\n", false).await?;
//!     let text = hub.read_output("s1", Duration::from_secs(2), true).await?;
//!     println!("{text}");
//!
//!     hub.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod connection;
pub mod credential;
pub mod error;
pub mod execution;
pub mod hub;
pub mod logging;
mod registry;
pub mod security;
pub mod session;
pub mod transfer;
pub mod transport;

// Re-export commonly used types
pub use connection::{AuthMethod, ConnectParams, ConnectionInfo};
pub use error::{EntityKind, HubError, Result};
pub use execution::{ExecOutput, RemoteCommand};
pub use hub::{SessionHub, ShutdownReport};
pub use session::{ShellOptions, ShellState};
pub use transfer::{CopyRequest, Endpoint};
