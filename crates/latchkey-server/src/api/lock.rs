//! Lock endpoints

use std::time::Duration;

use actix_web::{HttpResponse, delete, post, web};
use latchkey_common::error::PARAMETER_MISSING;
use latchkey_core::LockService;
use tracing::{info, warn};

use super::model::{AcquireRequest, LockResponse, LockTokenRequest};
use crate::model::response::ErrorResult;

fn missing(message: &str) -> HttpResponse {
    ErrorResult::http_response(400, &PARAMETER_MISSING, message.to_string())
}

/// Acquire a lock
#[post("/locks")]
pub async fn acquire(
    service: web::Data<LockService>,
    body: web::Json<AcquireRequest>,
) -> HttpResponse {
    let AcquireRequest { resource, ttl } = body.into_inner();
    let (Some(resource), Some(ttl)) = (resource, ttl) else {
        return missing("resource and ttl are required");
    };

    match service.acquire(&resource, Duration::from_millis(ttl)).await {
        Ok(handle) => HttpResponse::Created().json(LockResponse::from_handle("acquired", &handle)),
        Err(e) => {
            warn!(resource = %resource, error = %e, "Failed to acquire lock");
            ErrorResult::from_lock_error(&e)
        }
    }
}

/// Release a lock. No-op and partial releases answer 204 as well.
#[delete("/locks")]
pub async fn release(
    service: web::Data<LockService>,
    body: web::Json<LockTokenRequest>,
) -> HttpResponse {
    let LockTokenRequest { resource, value } = body.into_inner();
    let (Some(resource), Some(value)) = (resource, value) else {
        return missing("resource and value are required");
    };

    match service.release(&resource, &value).await {
        Ok(outcome) => {
            info!(resource = %resource, outcome = outcome.as_str(), "Release request handled");
            HttpResponse::NoContent().finish()
        }
        Err(e) => ErrorResult::from_lock_error(&e),
    }
}

/// Extend a lock held by this server
#[post("/locks/extend")]
pub async fn extend(
    service: web::Data<LockService>,
    body: web::Json<LockTokenRequest>,
) -> HttpResponse {
    let LockTokenRequest { resource, value } = body.into_inner();
    let (Some(resource), Some(value)) = (resource, value) else {
        return missing("resource and value are required");
    };

    match service.extend_token(&resource, &value).await {
        Ok(handle) => HttpResponse::Ok().json(LockResponse::from_handle("extended", &handle)),
        Err(e) => ErrorResult::from_lock_error(&e),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(acquire).service(release).service(extend);
}
