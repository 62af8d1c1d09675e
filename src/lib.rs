//! Home Connect Gateway Library
//!
//! Brokers the OAuth 2.0 Device Authorization Grant against the Home Connect
//! API and proxies authenticated appliance requests.
//!
//! # Features
//!
//! - **Device flow**: background authorize/poll loop that acquires tokens
//!   without any stored secrets beyond a client ID
//! - **Proxy gate**: forwards appliance requests with the current bearer
//!   token, or rejects with a typed "not ready" response
//! - **Health**: liveness and readiness endpoints that expose the
//!   authorization state to operators
//!
//! Tokens are held in memory only; a restart always begins a fresh device
//! authorization.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod upstream;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
