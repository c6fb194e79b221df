//! Main entry point for the Latchkey lock server.

use actix_web::web;
use anyhow::Context;
use latchkey_server::{model::Configuration, startup};
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let logging_config = configuration.logging_config();
    let _logging_guard = startup::init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let metrics = startup::init_metrics()?;

    let service = web::Data::new(startup::build_lock_service(&configuration)?);

    let address = configuration.server_address();
    let port = configuration.server_port();
    let server = startup::main_server(service.clone(), metrics, address.clone(), port)
        .with_context(|| format!("failed to bind {}:{}", address, port))?;
    info!("Latchkey lock server listening on {}:{}", address, port);

    startup::run_until_shutdown(server, service, startup::wait_for_shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Latchkey lock server stopped");
    Ok(())
}
