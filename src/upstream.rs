//! Home Connect API client
//!
//! Speaks the two upstream surfaces the gateway cares about: the OAuth
//! device-flow endpoints (authorize, exchange, refresh) and the appliance
//! API itself for proxied requests. Token state lives in the injected
//! [`CredentialStore`]; proxying never mutates it.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::CredentialStore;
use crate::config::UpstreamConfig;
use crate::{Error, Result};

/// Device-code grant type, per RFC 8628.
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// OAuth error code for "user has not completed the manual step yet".
pub const AUTHORIZATION_PENDING: &str = "authorization_pending";

/// Response of `POST /security/oauth/device_authorization`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    /// Device code for the later token exchange
    pub device_code: String,
    /// Short code the user enters at the verification URL
    pub user_code: String,
    /// URL the user must visit to authorize the client
    pub verification_uri: String,
    /// Verification URL with the user code pre-filled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    /// Lifetime of the device code in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Server-mandated minimum polling interval in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

/// Response of `POST /security/oauth/token` for both the device-code and
/// refresh grants. Carries either tokens or an OAuth error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token, present on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Refresh token; a refresh response may omit it when no rotation occurs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type (usually "Bearer")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Access token lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// OAuth error code, present on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Whether the user has not yet completed the manual authorization step.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.error.as_deref() == Some(AUTHORIZATION_PENDING)
    }
}

/// Verbatim relay of an upstream appliance response.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    /// Upstream HTTP status code
    pub status: u16,
    /// Upstream `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Raw response body
    pub body: Bytes,
}

/// Client for the Home Connect API and its OAuth endpoints.
pub struct ApplianceClient {
    http: Client,
    base_url: String,
    client_id: String,
    scope: String,
    store: Arc<CredentialStore>,
}

impl ApplianceClient {
    /// Create a client against the configured upstream, writing acquired
    /// credentials into `store`.
    #[must_use]
    pub fn new(http: Client, config: &UpstreamConfig, store: Arc<CredentialStore>) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
            store,
        }
    }

    /// Step 1 of the device flow: request a device code and verification URL.
    ///
    /// On success the pair is recorded in the store, overwriting any earlier
    /// attempt; restarting authorization is always safe.
    pub async fn start_device_authorization(&self) -> Result<DeviceAuthorizationResponse> {
        let response = self
            .http
            .post(format!("{}/security/oauth/device_authorization", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Device authorization failed: HTTP {status} - {body}"
            )));
        }

        let payload: DeviceAuthorizationResponse = response.json().await?;

        info!(
            verification_uri = %payload.verification_uri,
            user_code = %payload.user_code,
            expires_in = ?payload.expires_in,
            "Device authorization started; complete the manual step in a browser"
        );

        self.store
            .record_device_authorization(&payload.device_code, &payload.verification_uri);

        Ok(payload)
    }

    /// Step 2 of the device flow: exchange the device code for tokens.
    ///
    /// The upstream answers OAuth errors (`authorization_pending` included)
    /// as a JSON payload, which is returned as-is; the store is only written
    /// when the payload carries an access token.
    pub async fn exchange_device_code(&self, device_code: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/security/oauth/token", self.base_url))
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
            ])
            .send()
            .await?;

        // Error payloads arrive with 4xx statuses; parse the body either way.
        let payload: TokenResponse = response.json().await?;

        if payload.is_pending() {
            debug!("Authorization pending; user has not completed the manual step");
        } else if let Some(ref error) = payload.error {
            warn!(error = %error, description = ?payload.error_description, "Token exchange failed");
        } else if let Some(ref access_token) = payload.access_token {
            self.store.record_tokens(
                access_token,
                payload.refresh_token.as_deref(),
                payload.expires_in,
            );
            info!("Device flow complete; tokens acquired");
        } else {
            warn!("Token response without access_token or error; nothing stored");
        }

        Ok(payload)
    }

    /// Refresh the access token with the `refresh_token` grant.
    ///
    /// On success the store is updated with the new access token and with
    /// the new refresh token if the server rotated one, otherwise the token
    /// passed in is retained. On an OAuth error the payload is returned to
    /// the caller and the store is left untouched.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/security/oauth/token", self.base_url))
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let payload: TokenResponse = response.json().await?;

        if let Some(ref error) = payload.error {
            warn!(error = %error, description = ?payload.error_description, "Token refresh failed");
            return Ok(payload);
        }

        if let Some(ref access_token) = payload.access_token {
            // Rotation pass-through: keep the old refresh token when the
            // server does not issue a new one.
            let new_refresh = payload.refresh_token.as_deref().unwrap_or(refresh_token);
            self.store
                .record_tokens(access_token, Some(new_refresh), payload.expires_in);
            info!("Token refreshed");
        } else {
            warn!("Refresh response without access_token; store not updated");
        }

        Ok(payload)
    }

    /// Forward a request to the appliance API with the given bearer token.
    ///
    /// The body is buffered fully in memory; fine for appliance control
    /// payloads, which are small.
    pub async fn forward(
        &self,
        access_token: &str,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
        content_type: Option<&str>,
    ) -> Result<ProxiedResponse> {
        let url = format!("{}/{}", self.base_url, path_and_query.trim_start_matches('/'));

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.bsh.sdk.v1+json, application/json");

        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await?;

        debug!(url = %url, status = status, bytes = body.len(), "Proxied upstream response");

        Ok(ProxiedResponse {
            status,
            content_type,
            body,
        })
    }
}
