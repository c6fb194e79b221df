//! HTTP response types for Latchkey server

use actix_web::{HttpResponse, HttpResponseBuilder, http::StatusCode};
use latchkey_common::{ErrorCode, LockError};
use serde::{Deserialize, Serialize};

/// Error body returned by every failing endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResult {
    pub error: String,
    pub code: i32,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResult {
    pub fn new(code: &ErrorCode<'_>, message: String) -> Self {
        ErrorResult {
            error: code.message.to_string(),
            code: code.code,
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn http_response(status: u16, code: &ErrorCode<'_>, message: String) -> HttpResponse {
        HttpResponseBuilder::new(
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        )
        .json(ErrorResult::new(code, message))
    }

    pub fn from_lock_error(error: &LockError) -> HttpResponse {
        Self::http_response(error.http_status(), &error.error_code(), error.to_string())
    }
}
