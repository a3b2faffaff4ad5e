//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pwa_cache_core::CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] pwa_cache_proxy::ProxyError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Proxy(e) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", e.to_string()),
            ApiError::Core(e) => match e {
                // Network failure with nothing cached
                CoreError::Proxy(inner) => {
                    (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", inner.to_string())
                }
                CoreError::Storage(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    e.to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    e.to_string(),
                ),
            },
        };

        if status.is_server_error() {
            warn!("{}: {}", code, message);
        }

        let body = axum::Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwa_cache_proxy::ProxyError;

    #[test]
    fn test_network_failure_is_bad_gateway() {
        let error = ApiError::Core(CoreError::Proxy(ProxyError::InvalidResponse(
            "connection refused".to_string(),
        )));
        assert_eq!(error.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_lifecycle_error_is_internal() {
        let error = ApiError::Core(CoreError::Lifecycle("not installed".to_string()));
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
