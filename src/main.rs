//! pico-drive server binary.
//!
//! Serves one directory tree over HTTP: `GET` lists directories or downloads
//! files, `POST` uploads a multipart `file` field into a directory, `DELETE`
//! removes a single entry. Optional Basic auth guards every route.

mod app;
mod atomic;
mod auth;
mod config;
mod disk;
mod error;
mod etag;
mod files;
mod http;
mod listing;
mod logging;
mod storage;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::auth::AuthGate;
use crate::config::{Args, SHUTDOWN_GRACE_SECS, ServerConfig};

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let args = Args::parse();
    let config = Arc::new(ServerConfig::from_args(args)?);
    let _log_guard = logging::init_logging(config.log_file.as_deref())?;

    let addr = SocketAddr::new(config.bind, config.port);
    info!(
        root = %config.root.display(),
        auth = matches!(config.auth, AuthGate::Enabled { .. }),
        upload_limit = config.upload_limit,
        log_file = ?config.log_file,
        "serving directory"
    );
    let app = app::build_router(config);
    let handle = Handle::new();

    info!("Starting HTTP server at {}", addr);
    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::spawn(shutdown_signal(handle));
    server.await
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
