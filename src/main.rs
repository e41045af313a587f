//! ssh-session-hub binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use ssh_session_hub::api::{create_router, serve, AppState};
use ssh_session_hub::cli::{parse_args, print_help, print_version};
use ssh_session_hub::config::Config;
use ssh_session_hub::transport::SshTransport;
use ssh_session_hub::{logging, SessionHub};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'ssh-session-hub --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _ = logging::init_with_filter(config.log_filter());

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("ssh-session-hub v{}", env!("CARGO_PKG_VERSION"));

    let server_config = config.to_server_config()?;
    let transport = SshTransport::new().with_connect_timeout(config.connect_timeout());
    let hub = Arc::new(SessionHub::with_typing(
        Arc::new(transport),
        config.typing_pacer(),
    ));

    let auth = Arc::new(config.api_key_store());
    if auth.is_enabled() {
        info!("API key authentication enabled ({} keys)", auth.count());
    }

    let state = AppState::new(Arc::clone(&hub)).with_defaults(config.api_defaults());
    let router = create_router(state, auth);

    // Close shells and connections as soon as the signal arrives, so long
    // polls and remote commands end before the server drains them.
    let signal_hub = Arc::clone(&hub);
    let shutdown = async move {
        shutdown_signal().await;
        signal_hub.shutdown().await;
    };
    let served = serve(server_config, router, shutdown).await;

    // Anything opened while draining, or everything if the server failed.
    let report = hub.shutdown().await;
    info!(
        "Shutdown complete: closed {} sessions, {} connections after drain",
        report.sessions, report.connections
    );
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
