//! Graceful shutdown
//!
//! The HTTP server runs with actix's own signal handling disabled. Once a
//! shutdown is requested the server stops accepting connections and every
//! held lock is released while the workers are still running: node
//! connections and auto-extenders opened from request handlers live on those
//! workers. The workers are stopped afterwards.

use std::future::Future;
use std::io;

use actix_web::dev::Server;
use actix_web::web;
use latchkey_core::LockService;
use tracing::{error, info};

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Run `server` until it ends on its own or `shutdown` resolves.
pub async fn run_until_shutdown<S>(
    server: Server,
    service: web::Data<LockService>,
    shutdown: S,
) -> io::Result<()>
where
    S: Future<Output = ()>,
{
    let handle = server.handle();
    let mut running = actix_web::rt::spawn(server);

    tokio::select! {
        result = &mut running => {
            return result.map_err(io::Error::other)?;
        }
        _ = shutdown => {}
    }

    handle.pause().await;
    info!(
        active = service.active_count(),
        "Stopped accepting connections, releasing held locks"
    );
    service.shutdown().await;

    handle.stop(true).await;
    running.await.map_err(io::Error::other)?
}
