//! In-process mock of the Home Connect API for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::post,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Scripted upstream behavior for one test.
pub struct MockBehavior {
    /// Number of `authorization_pending` responses before the device-code
    /// exchange succeeds
    pub pending_polls: usize,
    /// `expires_in` reported with the device-code token response
    pub token_expires_in: Option<u64>,
    /// Whether the refresh response rotates in a new refresh token ("R2")
    pub refresh_rotates: bool,
    /// OAuth error returned by the refresh grant instead of tokens
    pub refresh_error: Option<String>,
    /// Status/content-type/body for proxied appliance requests
    pub api_status: u16,
    pub api_content_type: String,
    pub api_body: Vec<u8>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            pending_polls: 0,
            token_expires_in: Some(86400),
            refresh_rotates: false,
            refresh_error: None,
            api_status: 200,
            api_content_type: "application/vnd.bsh.sdk.v1+json".to_string(),
            api_body: br#"{"data":{"homeappliances":[]}}"#.to_vec(),
        }
    }
}

/// What the mock saw on the last proxied appliance request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Shared state of the mock upstream.
pub struct MockState {
    pub behavior: MockBehavior,
    pub device_auth_hits: AtomicUsize,
    pub token_hits: AtomicUsize,
    pub api_hits: AtomicUsize,
    pub last_api_request: Mutex<Option<RecordedRequest>>,
}

impl MockState {
    pub fn api_hit_count(&self) -> usize {
        self.api_hits.load(Ordering::SeqCst)
    }

    pub fn token_hit_count(&self) -> usize {
        self.token_hits.load(Ordering::SeqCst)
    }

    pub fn device_auth_hit_count(&self) -> usize {
        self.device_auth_hits.load(Ordering::SeqCst)
    }
}

/// Spawn the mock on an ephemeral port; returns its base URL and state.
pub async fn spawn_mock_upstream(behavior: MockBehavior) -> (String, Arc<MockState>) {
    let state = Arc::new(MockState {
        behavior,
        device_auth_hits: AtomicUsize::new(0),
        token_hits: AtomicUsize::new(0),
        api_hits: AtomicUsize::new(0),
        last_api_request: Mutex::new(None),
    });

    let app = Router::new()
        .route(
            "/security/oauth/device_authorization",
            post(device_authorization_handler),
        )
        .route("/security/oauth/token", post(token_handler))
        .fallback(api_handler)
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

async fn device_authorization_handler(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.device_auth_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "device_code": "D1",
        "user_code": "ABCD-EFGH",
        "verification_uri": "https://verify/X",
        "expires_in": 300,
        "interval": 0,
    }))
}

async fn token_handler(State(state): State<Arc<MockState>>, body: String) -> Response {
    let params: HashMap<String, String> = serde_urlencoded::from_str(&body).unwrap_or_default();

    if params.get("grant_type").map(String::as_str) == Some("refresh_token") {
        if let Some(ref error) = state.behavior.refresh_error {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response();
        }
        let mut payload = json!({ "access_token": "A2", "expires_in": 86400 });
        if state.behavior.refresh_rotates {
            payload["refresh_token"] = json!("R2");
        }
        return Json(payload).into_response();
    }

    let polls = state.token_hits.fetch_add(1, Ordering::SeqCst);
    if polls < state.behavior.pending_polls {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "authorization_pending" })),
        )
            .into_response();
    }

    let mut payload = json!({ "access_token": "A", "refresh_token": "R" });
    if let Some(expires_in) = state.behavior.token_expires_in {
        payload["expires_in"] = json!(expires_in);
    }
    Json(payload).into_response()
}

async fn api_handler(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.api_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_api_request.lock() = Some(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(ToString::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        body: body.to_vec(),
    });

    Response::builder()
        .status(StatusCode::from_u16(state.behavior.api_status).unwrap())
        .header(header::CONTENT_TYPE, &state.behavior.api_content_type)
        .body(Body::from(state.behavior.api_body.clone()))
        .unwrap()
}
