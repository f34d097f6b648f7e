//! API server using Axum
//!
//! Exposes the check endpoint and liveness routes.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::Result;

use super::middleware::cors_layer;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub started_at: Instant,
}

/// API server
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: Config) -> Self {
        let state = AppState {
            config,
            started_at: Instant::now(),
        };

        Self { state }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        let cors = cors_layer(&self.state.config.api.cors_origins);

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self
            .state
            .config
            .api_addr()
            .parse()
            .map_err(|_| crate::error::PulseError::InvalidConfig("invalid bind address".into()))?;

        let router = self.build_router();

        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| crate::error::PulseError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
