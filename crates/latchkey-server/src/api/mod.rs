//! HTTP API

use actix_web::{error::InternalError, web};
use latchkey_common::error::PARAMETER_VALIDATE_ERROR;

use crate::model::response::ErrorResult;

pub mod health;
pub mod lock;
pub mod model;

/// Malformed JSON bodies answer 400 with the API's error body.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response =
            ErrorResult::http_response(400, &PARAMETER_VALIDATE_ERROR, err.to_string());
        InternalError::from_response(err, response).into()
    })
}

/// Register every route
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config());
    lock::configure(cfg);
    health::configure(cfg);
}
