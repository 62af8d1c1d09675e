//! Background device authorization flow
//!
//! One long-lived task per process: authorize, wait, then poll the token
//! endpoint until tokens arrive or the gateway shuts down. Transient and
//! terminal upstream errors alike are retried; only a successful
//! acquisition, an already-authenticated observation, or cancellation stops
//! the loop. Refresh is request-triggered and lives on
//! [`ApplianceClient::refresh_tokens`](crate::upstream::ApplianceClient::refresh_tokens),
//! not here.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::auth::{AuthStatus, CredentialStore};
use crate::config::DeviceFlowConfig;
use crate::upstream::ApplianceClient;

/// Driver for the background authorize/poll state machine.
pub struct DeviceFlow {
    client: Arc<ApplianceClient>,
    store: Arc<CredentialStore>,
    config: DeviceFlowConfig,
}

impl DeviceFlow {
    /// Create a new flow driver.
    #[must_use]
    pub fn new(
        client: Arc<ApplianceClient>,
        store: Arc<CredentialStore>,
        config: DeviceFlowConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Run the flow to completion or cancellation.
    ///
    /// Every wait point races against `shutdown`; cancellation does not
    /// interrupt an in-flight upstream call, only the next iteration.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut poll_interval = self.config.poll_interval;

        // Step 1: request a device code, retrying indefinitely.
        loop {
            match self.client.start_device_authorization().await {
                Ok(payload) => {
                    poll_interval = effective_interval(&self.config, payload.interval);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Device authorization request failed; retrying");
                    if !sleep_or_shutdown(poll_interval, &mut shutdown).await {
                        return;
                    }
                }
            }
        }

        // Step 2: give the user a head start before the first poll.
        info!(
            initial_delay = ?self.config.initial_poll_delay,
            poll_interval = ?poll_interval,
            "Polling for token after the initial delay"
        );
        if !sleep_or_shutdown(self.config.initial_poll_delay, &mut shutdown).await {
            return;
        }

        // Step 3: poll until tokens arrive.
        loop {
            match self.store.status() {
                AuthStatus::WaitingForManualTasks { device_code, .. } => {
                    match self.client.exchange_device_code(&device_code).await {
                        Ok(payload) if payload.access_token.is_some() => {
                            info!("Token acquired; startup polling stops");
                            return;
                        }
                        Ok(payload) if payload.is_pending() => {
                            debug!("Authorization still pending");
                        }
                        Ok(payload) => {
                            // Terminal OAuth errors are retried too; there is
                            // no recovery path without user intervention.
                            warn!(error = ?payload.error, "Token exchange error; continuing to poll");
                        }
                        Err(e) => {
                            warn!(error = %e, "Token poll failed; continuing");
                        }
                    }
                }
                AuthStatus::Up { .. } => {
                    info!("Already authenticated; startup polling stops");
                    return;
                }
                AuthStatus::TokenExpired { .. } => {
                    // The device code is presumed invalid for re-exchange;
                    // renewal happens through the refresh endpoint.
                    info!("Token expired while polling; waiting for a refresh");
                }
                AuthStatus::StartingDeviceAuthorization => {
                    // Store was reset underneath us; restart authorization.
                    match self.client.start_device_authorization().await {
                        Ok(payload) => {
                            poll_interval = effective_interval(&self.config, payload.interval);
                        }
                        Err(e) => {
                            warn!(error = %e, "Device authorization restart failed; retrying");
                        }
                    }
                }
            }

            if !sleep_or_shutdown(poll_interval, &mut shutdown).await {
                return;
            }
        }
    }
}

/// Configured poll interval, bumped up to the upstream-advertised minimum
/// when the server demands a slower cadence.
fn effective_interval(config: &DeviceFlowConfig, advertised_secs: Option<u64>) -> Duration {
    let advertised = Duration::from_secs(advertised_secs.unwrap_or(0));
    cmp::max(config.poll_interval, advertised)
}

/// Sleep for `duration`, returning `false` if shutdown wins the race.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        () = sleep(duration) => true,
        _ = shutdown.recv() => {
            info!("Device flow cancelled");
            false
        }
    }
}
