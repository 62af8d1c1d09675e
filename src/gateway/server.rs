//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use super::router::{AppState, create_router};
use crate::auth::{CredentialStore, DeviceFlow};
use crate::config::Config;
use crate::upstream::ApplianceClient;
use crate::{Error, Result};

/// Home Connect gateway server
pub struct Gateway {
    config: Config,
    store: Arc<CredentialStore>,
    client: Arc<ApplianceClient>,
}

impl Gateway {
    /// Create a new gateway from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(CredentialStore::new());

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let client = Arc::new(ApplianceClient::new(http, &config.upstream, Arc::clone(&store)));

        Ok(Self {
            config,
            store,
            client,
        })
    }

    /// Run the gateway until a shutdown signal arrives.
    ///
    /// Spawns the background device flow, serves the router, and cancels
    /// the flow through a broadcast channel on shutdown.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        // Background device authorization flow, cancelled on shutdown.
        let flow = DeviceFlow::new(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            self.config.device_flow.clone(),
        );
        let flow_shutdown = shutdown_tx.subscribe();
        let flow_task = tokio::spawn(async move {
            flow.run(flow_shutdown).await;
        });

        let state = Arc::new(AppState {
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
        });
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("HOME CONNECT GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(upstream = %self.config.upstream.base_url, "Proxying to Home Connect API");
        info!("Device flow: GET /auth/device/start, /auth/device/token, /auth/token/refresh");
        info!("Readiness:   GET /health/ready");
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        // The flow exits at its next cancellation checkpoint.
        let _ = flow_task.await;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
