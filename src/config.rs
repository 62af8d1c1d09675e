//! Configuration management

use std::{env, time::Duration};

use figment::{Figment, providers::Env};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Environment variable holding the Home Connect client ID.
///
/// Honored directly (without the `HC_GATEWAY_` prefix) because this is the
/// variable name the Home Connect developer portal documentation uses.
pub const CLIENT_ID_ENV: &str = "HOME_CONNECT_CLIENT_ID";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Upstream Home Connect API configuration
    pub upstream: UpstreamConfig,
    /// Device authorization flow timing
    pub device_flow: DeviceFlowConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Upstream Home Connect API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the Home Connect API
    pub base_url: String,
    /// OAuth client ID (required; the process refuses to start without it)
    pub client_id: String,
    /// OAuth scope requested during device authorization
    pub scope: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.home-connect.com".to_string(),
            client_id: String::new(),
            scope: "IdentifyAppliance Monitor Settings Control".to_string(),
        }
    }
}

/// Timing for the background device authorization flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFlowConfig {
    /// Delay before the first token poll after device authorization starts
    #[serde(with = "humantime_serde")]
    pub initial_poll_delay: Duration,
    /// Interval between token polls. The upstream-advertised minimum wins
    /// when it is larger, to avoid `slow_down` rejections.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for DeviceFlowConfig {
    fn default() -> Self {
        Self {
            initial_poll_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// All fields can be set via `HC_GATEWAY_`-prefixed variables
    /// (e.g. `HC_GATEWAY_SERVER__PORT=9090`); the client ID additionally
    /// falls back to [`CLIENT_ID_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if extraction fails or validation rejects
    /// the result (missing client ID, unparsable base URL).
    pub fn load() -> Result<Self> {
        let mut config: Self = Figment::new()
            .merge(Env::prefixed("HC_GATEWAY_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        if config.upstream.client_id.trim().is_empty() {
            if let Ok(value) = env::var(CLIENT_ID_ENV) {
                config.upstream.client_id = value;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.upstream.client_id.trim().is_empty() {
            return Err(Error::Config(format!(
                "{CLIENT_ID_ENV} is not set; export {CLIENT_ID_ENV}=YOUR_CLIENT_ID and retry"
            )));
        }

        Url::parse(&self.upstream.base_url)
            .map_err(|e| Error::Config(format!("Invalid upstream base URL: {e}")))?;

        if self.device_flow.poll_interval.is_zero() {
            return Err(Error::Config("poll_interval must be non-zero".to_string()));
        }

        Ok(())
    }
}
