//! Request-id propagation and API-key enforcement, run in that order
//! so every response, including a rejected one, carries `X-Request-Id`
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use mcpproxy_core::context::RequestContext;
use mcpproxy_core::error::ProxyError;
use subtle::ConstantTimeEq;

/// Reads `X-Request-Id` (validating it against [`RequestContext`]'s pattern), generates a
/// fresh UUID v4 otherwise, and stamps the response header so the value
/// is visible even on a handler error.
pub async fn request_id(mut request: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let client_supplied = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let ctx = RequestContext::new(client_supplied.as_deref());
    let request_id = ctx.request_id.clone();
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Enforces `X-Api-Key` / `?apikey=` on every request except those
/// arriving over a trusted local transport.
pub async fn api_key(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.api_key else {
        return Ok(next.run(request).await);
    };
    if state.trusted_transport {
        return Ok(next.run(request).await);
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let query_key = request.uri().query().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "apikey")
            .map(|(_, v)| v.into_owned())
    });

    let provided = header_key.or(query_key).unwrap_or_default();
    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(next.run(request).await)
    } else {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.request_id.clone())
            .unwrap_or_default();
        Err(ApiError::new(
            ProxyError::auth_error("missing or invalid API key"),
            request_id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::state::AppState;
    use crate::{router, ServerInfo};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use mcpproxy_auth::flow::OAuthFlow;
    use mcpproxy_auth::tokens::{InMemoryTokenStore, TokenStore};
    use mcpproxy_index::ToolIndex;
    use mcpproxy_server::Dispatcher;
    use mcpproxy_storage::Database;
    use mcpproxy_supervisor::{events::EventBus, Supervisor};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state_with_api_key(api_key: Option<&str>, trusted_transport: bool) -> AppState {
        let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::default());
        let index = Arc::new(ToolIndex::in_memory().unwrap());
        let supervisor = Supervisor::new(index, store.clone(), Arc::new(OAuthFlow::new(store).unwrap()), EventBus::new());
        let db = Database::temporary().unwrap();
        let activity = Arc::new(db.activity_log().unwrap());
        AppState {
            dispatcher: Arc::new(Dispatcher::new(supervisor.clone(), activity.clone())),
            supervisor,
            activity,
            info: ServerInfo { listen_addr: "127.0.0.1:0".into(), web_ui_url: None },
            api_key: api_key.map(str::to_string),
            trusted_transport,
            control: None,
            importer: None,
        }
    }

    #[tokio::test]
    async fn missing_api_key_returns_json_error_body_with_request_id() {
        let app = router(state_with_api_key(Some("s3cr3t"), false));
        let response = app
            .oneshot(Request::builder().uri("/api/v1/servers").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let header_request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(!header_request_id.is_empty());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unauthenticated");
        assert_eq!(json["request_id"], header_request_id);
        assert!(json["message"].is_string());
    }

    #[tokio::test]
    async fn trusted_transport_bypasses_api_key_even_when_configured() {
        let app = router(state_with_api_key(Some("s3cr3t"), true));
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
