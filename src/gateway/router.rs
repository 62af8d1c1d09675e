//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::warn;

use super::proxy::proxy_handler;
use crate::auth::CredentialStore;
use crate::upstream::ApplianceClient;

/// Shared application state
pub struct AppState {
    /// Credential store read by the gate and health endpoints
    pub store: Arc<CredentialStore>,
    /// Upstream client used by the manual triggers and the proxy
    pub client: Arc<ApplianceClient>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(health_handler))
        .route("/health/ready", get(ready_handler))
        .route("/auth/device/start", get(device_start_handler))
        .route("/auth/device/token", get(device_token_handler))
        .route("/auth/token/refresh", get(token_refresh_handler))
        .route(
            "/proxy/{*path}",
            get(proxy_handler)
                .post(proxy_handler)
                .put(proxy_handler)
                .delete(proxy_handler),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health and /health/live - liveness, independent of auth state
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "UP" }))
}

/// GET /health/ready - ready iff the device flow has produced valid tokens.
///
/// The authorization check always names the precise status so operators can
/// tell "never started" from "needs a human" from "needs a refresh".
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.store.status();
    let ready = status.is_up();

    let http_status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(json!({
            "status": if ready { "READY" } else { "NOT_READY" },
            "checks": {
                "authorization": status.readiness_label(),
            },
        })),
    )
}

/// GET /auth/device/start - start or restart device authorization.
///
/// Idempotent: a new attempt simply overwrites the stored device code and
/// verification URL.
async fn device_start_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.client.start_device_authorization().await {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => {
            warn!(error = %e, "Device authorization failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "status": "ERROR", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /auth/device/token - exchange the stored device code for tokens.
///
/// Maps upstream outcomes to HTTP: `authorization_pending` to 202, other
/// OAuth errors to 400, success to 200.
async fn device_token_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(device_code) = state.store.device_code() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "ERROR",
                "message": "No device_code available. Start device authorization first.",
                "hint": "Call /auth/device/start and follow the instructions",
            })),
        )
            .into_response();
    };

    match state.client.exchange_device_code(&device_code).await {
        Ok(payload) if payload.is_pending() => {
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
        Ok(payload) if payload.error.is_some() => {
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => {
            warn!(error = %e, "Token exchange failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "status": "ERROR", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /auth/token/refresh - refresh the access token.
///
/// 400 when no refresh token exists yet or the upstream reports an OAuth
/// error; 200 on success. Refresh failures are never retried here; the
/// caller decides.
async fn token_refresh_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(refresh_token) = state.store.refresh_token() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "ERROR",
                "message": "No refresh_token available. Obtain tokens first via device authorization.",
                "hint": "Run /auth/device/start then /auth/device/token until success",
            })),
        )
            .into_response();
    };

    match state.client.refresh_tokens(&refresh_token).await {
        Ok(payload) if payload.error.is_some() => {
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => {
            warn!(error = %e, "Token refresh failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "status": "ERROR", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}
