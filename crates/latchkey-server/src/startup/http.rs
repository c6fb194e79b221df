//! HTTP server setup

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};
use latchkey_core::LockService;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::api;

/// Creates and binds the main HTTP server. Signals are left to
/// [`run_until_shutdown`](super::run_until_shutdown).
pub fn main_server(
    service: web::Data<LockService>,
    metrics: PrometheusHandle,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    let metrics = web::Data::new(metrics);
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(service.clone())
            .app_data(metrics.clone())
            .configure(api::routes)
    })
    .disable_signals()
    .bind((address, port))?
    .run())
}
