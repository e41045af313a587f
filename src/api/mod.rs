//! HTTP/JSON API over the session hub.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /api/v1/` - API information
//!
//! ### Connections
//! - `GET|POST /api/v1/connections` - List / connect
//! - `DELETE /api/v1/connections/{id}` - Disconnect
//! - `POST /api/v1/connections/{id}/execute` - Run a command
//! - `GET|PUT /api/v1/connections/{id}/cwd` - Get / set working directory
//!
//! ### Files
//! - `POST /api/v1/files/copy` - Copy between `"local"` and connections
//! - `POST /api/v1/files/list` - List a directory
//! - `POST /api/v1/files/info` - Stat a path
//!
//! ### Shells
//! - `GET|POST /api/v1/shells` - List / start
//! - `POST /api/v1/shells/{id}/input` - Send input
//! - `POST /api/v1/shells/{id}/output` - Read buffered output
//! - `DELETE /api/v1/shells/{id}` - Close
//!
//! ### Credentials
//! - `GET|POST /api/v1/credentials` - List (masked) / save
//! - `DELETE /api/v1/credentials/{id}` - Delete
//! - `POST /api/v1/credentials/{id}/connect` - Connect using a credential

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::{ApiDefaults, AppState};
pub use router::{create_router, serve, ServerConfig};
pub use types::ErrorResponse;
