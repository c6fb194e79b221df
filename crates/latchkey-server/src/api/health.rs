//! Health and metrics endpoints

use actix_web::{HttpResponse, get, web};
use latchkey_core::LockService;
use metrics_exporter_prometheus::PrometheusHandle;

use super::model::HealthResponse;

#[get("/health")]
pub async fn health(service: web::Data<LockService>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "UP".to_string(),
        nodes: service.node_count(),
        quorum: service.quorum(),
        active_locks: service.active_count(),
    })
}

/// Prometheus text exposition
#[get("/metrics")]
pub async fn metrics(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(metrics);
}
