//! Converts `ProxyError` into the wire error body:
//! `{ error, message, request_id, suggestion?, details?, correlation_id? }`.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use mcpproxy_core::error::ProxyError;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

/// A `ProxyError` plus the request-scoped metadata needed to render it
/// (the request's `request_id`, and on OAuth endpoints a `correlation_id`).
pub struct ApiError {
    error: ProxyError,
    request_id: String,
    suggestion: Option<String>,
    correlation_id: Option<String>,
}

impl ApiError {
    pub fn new(error: ProxyError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
            suggestion: None,
            correlation_id: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error.code();
        let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: code.as_str(),
            message: self.error.to_string(),
            request_id: self.request_id.clone(),
            suggestion: self.suggestion,
            details: None,
            correlation_id: self.correlation_id,
        };
        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
}

/// The `{ success: true, data }` wrapper every non-error response uses
pub fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(serde_json::json!({ "success": true, "data": data }))
}
