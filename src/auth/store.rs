//! In-memory credential store for the device authorization flow
//!
//! Holds the device code, verification URL, and OAuth tokens for the single
//! upstream account this gateway serves. State is ephemeral; a process
//! restart always begins a fresh device authorization.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info};

/// The mutable credential record guarded by [`CredentialStore`].
#[derive(Debug, Default, Clone)]
struct CredentialRecord {
    device_code: Option<String>,
    verification_url: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in_secs: Option<u64>,
    issued_at_ms: Option<u64>,
}

/// Derived authorization status, evaluated in fixed priority order.
///
/// Variants carry the data a caller acting on that status needs, so every
/// consumer is forced to handle each branch exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// No device code recorded yet; authorization has not started.
    StartingDeviceAuthorization,
    /// Device authorization started; a human still has to enter the user
    /// code at the verification URL.
    WaitingForManualTasks {
        /// Device code to exchange once the manual step completes
        device_code: String,
        /// URL the user must visit to authorize the client
        verification_url: String,
    },
    /// Tokens exist but the access token has passed its expiry.
    TokenExpired {
        /// Refresh token to renew with
        refresh_token: String,
    },
    /// Authenticated and ready to proxy requests.
    Up {
        /// Current access token
        access_token: String,
        /// Current refresh token
        refresh_token: String,
    },
}

impl AuthStatus {
    /// Variant name as used in proxy rejection messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartingDeviceAuthorization => "StartingDeviceAuthorization",
            Self::WaitingForManualTasks { .. } => "WaitingForManualTasks",
            Self::TokenExpired { .. } => "TokenExpired",
            Self::Up { .. } => "Up",
        }
    }

    /// Status label as reported by the readiness endpoint.
    #[must_use]
    pub fn readiness_label(&self) -> &'static str {
        match self {
            Self::StartingDeviceAuthorization => "STARTING_DEVICE_AUTHORIZATION",
            Self::WaitingForManualTasks { .. } => "WAITING_FOR_MANUAL_TASKS",
            Self::TokenExpired { .. } => "TOKEN_EXPIRED",
            Self::Up { .. } => "UP",
        }
    }

    /// Whether the gateway may proxy requests in this state.
    #[must_use]
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up { .. })
    }
}

/// Lock-guarded credential state shared between the device-flow task, the
/// proxy gate, and the health endpoints.
///
/// All mutations replace related fields together under one lock acquisition,
/// so readers never observe a half-updated record.
#[derive(Debug, Default)]
pub struct CredentialStore {
    record: Mutex<CredentialRecord>,
}

impl CredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the device code and verification URL of a (re)started device
    /// authorization. Token fields are left untouched.
    pub fn record_device_authorization(&self, device_code: &str, verification_url: &str) {
        let mut record = self.record.lock();
        record.device_code = Some(device_code.to_string());
        record.verification_url = Some(verification_url.to_string());
        debug!("Stored device code for later token exchange");
    }

    /// Record a fresh token pair.
    ///
    /// The refresh token is overwritten with exactly what is passed; a
    /// caller handling refresh rotation must pass the previous token through
    /// itself when the server omits a new one. `expires_in` is stored
    /// verbatim; `None` means the token never expires for status purposes.
    pub fn record_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: Option<u64>,
    ) {
        let issued_at = now_millis();
        let mut record = self.record.lock();
        record.access_token = Some(access_token.to_string());
        record.refresh_token = refresh_token.map(ToString::to_string);
        record.expires_in_secs = expires_in_secs;
        record.issued_at_ms = Some(issued_at);
        info!(issued_at_ms = issued_at, "Stored OAuth tokens in memory");
    }

    /// Device code of the current authorization attempt, if any.
    #[must_use]
    pub fn device_code(&self) -> Option<String> {
        self.record.lock().device_code.clone()
    }

    /// Currently stored refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.record.lock().refresh_token.clone()
    }

    /// Derive the current authorization status.
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.status_at(now_millis())
    }

    /// Derive the status as of `now_ms` (epoch milliseconds).
    ///
    /// Exposed separately so expiry behavior can be tested against a
    /// synthetic clock.
    #[must_use]
    pub fn status_at(&self, now_ms: u64) -> AuthStatus {
        let record = self.record.lock().clone();

        // 1) No device code yet: authorization has not started.
        let (Some(device_code), Some(verification_url)) =
            (record.device_code, record.verification_url)
        else {
            return AuthStatus::StartingDeviceAuthorization;
        };

        // 2) Device code present but no complete token pair yet.
        let (Some(access_token), Some(refresh_token)) =
            (record.access_token, record.refresh_token)
        else {
            return AuthStatus::WaitingForManualTasks {
                device_code,
                verification_url,
            };
        };

        // 3) Expiry is only signaled when both pieces of metadata are known.
        if let (Some(issued_at), Some(expires_in)) = (record.issued_at_ms, record.expires_in_secs)
        {
            let expires_at = issued_at.saturating_add(expires_in.saturating_mul(1000));
            if expires_at <= now_ms {
                return AuthStatus::TokenExpired { refresh_token };
            }
        }

        // 4) Otherwise we are up.
        AuthStatus::Up {
            access_token,
            refresh_token,
        }
    }

    /// Clear every field atomically. Test/ops hook only; production control
    /// flow never calls this.
    pub fn reset(&self) {
        *self.record.lock() = CredentialRecord::default();
        debug!("Credential store reset");
    }
}

/// Current time as epoch milliseconds.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
