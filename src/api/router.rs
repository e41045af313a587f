//! API router configuration.

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    api_info, close_shell, connect, connect_with_credential, copy_file, delete_credential,
    disconnect, execute, file_info, get_cwd, health, list_connections, list_credentials,
    list_files, list_shells, not_found, read_output, save_credential, send_input, set_cwd,
    start_shell, AppState,
};
use crate::security::{auth_middleware, ApiKeyStore};

/// Create the API router. `auth` guards everything under `/api/v1`.
pub fn create_router(state: AppState, auth: Arc<ApiKeyStore>) -> Router {
    let connection_routes = Router::new()
        .route("/", get(list_connections).post(connect))
        .route("/{id}", delete(disconnect))
        .route("/{id}/execute", post(execute))
        .route("/{id}/cwd", get(get_cwd).put(set_cwd));

    let file_routes = Router::new()
        .route("/copy", post(copy_file))
        .route("/list", post(list_files))
        .route("/info", post(file_info));

    let shell_routes = Router::new()
        .route("/", get(list_shells).post(start_shell))
        .route("/{id}", delete(close_shell))
        .route("/{id}/input", post(send_input))
        .route("/{id}/output", post(read_output));

    let credential_routes = Router::new()
        .route("/", get(list_credentials).post(save_credential))
        .route("/{id}", delete(delete_credential))
        .route("/{id}/connect", post(connect_with_credential));

    let api_v1 = Router::new()
        .route("/", get(api_info))
        .nest("/connections", connection_routes)
        .nest("/files", file_routes)
        .nest("/shells", shell_routes)
        .nest("/credentials", credential_routes)
        .layer(middleware::from_fn_with_state(auth, auth_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Stop accepting requests on the shutdown signal and drain in-flight
    /// ones before returning.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            graceful_shutdown: true,
        }
    }

    pub fn without_graceful_shutdown(mut self) -> Self {
        self.graceful_shutdown = false;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 3100)
    }
}

/// Serve the API until `shutdown` resolves.
pub async fn serve<F>(
    config: ServerConfig,
    router: Router,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Starting ssh-session-hub API server on {}", addr);

    let server = axum::serve(listener, router);
    if config.graceful_shutdown {
        server.with_graceful_shutdown(shutdown).await?;
    } else {
        tokio::select! {
            served = server.into_future() => served?,
            _ = shutdown => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::SessionHub;
    use crate::transport::FakeTransport;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3100);
        assert!(config.graceful_shutdown);
        assert_eq!(config.bind_address(), "127.0.0.1:3100");
    }

    #[test]
    fn test_server_config_custom() {
        let config = ServerConfig::new("0.0.0.0", 8080).without_graceful_shutdown();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(!config.graceful_shutdown);
    }

    #[test]
    fn test_router_creation() {
        let hub = Arc::new(SessionHub::new(Arc::new(FakeTransport::new())));
        let _router = create_router(AppState::new(hub), Arc::new(ApiKeyStore::disabled()));
    }
}
