//! Proxy gate
//!
//! Forwards inbound `/proxy/{*path}` requests to the appliance API with the
//! current bearer token, or rejects them with a typed "not ready" response.
//! The gate never mutates credential state.

use std::sync::Arc;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use super::router::AppState;
use crate::auth::AuthStatus;

/// Pointer included in error payloads so operators can find the wrapped API.
const API_SPEC_URL: &str = "https://apiclient.home-connect.com/";

/// Handler for all verbs on `/proxy/{*path}`.
///
/// Preconditions: the credential status must be exactly `Up`; any other
/// status yields a 503 naming the status, without touching the upstream.
/// Upstream transport failures yield a 502. Bodies are buffered fully in
/// memory before forwarding, and the path suffix is relayed byte for byte.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let status = state.store.status();
    let AuthStatus::Up { access_token, .. } = status else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "ERROR",
                "message": format!("Application is not ready: {}", status.name()),
                "hint": "Complete the device authorization flow until /health/ready reports READY",
                "homeConnectApiSpec": API_SPEC_URL,
            })),
        )
            .into_response();
    };

    // Take the suffix from the raw URI; the `Path` extractor percent-decodes
    // it, which would corrupt encoded segments in the rebuilt upstream URL.
    let raw = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    let path_and_query = raw.strip_prefix("/proxy/").unwrap_or(raw);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let body = (!body.is_empty()).then_some(body);

    match state
        .client
        .forward(&access_token, method, path_and_query, body, content_type)
        .await
    {
        Ok(proxied) => {
            let status =
                StatusCode::from_u16(proxied.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response = Response::builder().status(status);
            if let Some(ref content_type) = proxied.content_type {
                response = response.header(header::CONTENT_TYPE, content_type);
            }
            response
                .body(Body::from(proxied.body))
                .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
        }
        Err(e) => {
            warn!(error = %e, path = path_and_query, "Proxy request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "status": "ERROR",
                    "message": e.to_string(),
                    "homeConnectApiSpec": API_SPEC_URL,
                })),
            )
                .into_response()
        }
    }
}
