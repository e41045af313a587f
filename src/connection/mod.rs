//! Live connections: parameters, per-connection context and the registry.

mod context;
mod params;
mod registry;

pub use context::ConnectionContext;
pub use params::{AuthMethod, ConnectParams, DEFAULT_PORT};
pub use registry::{Connection, ConnectionInfo, ConnectionRegistry};
