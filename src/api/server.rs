//! API server setup and lifecycle.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ApiConfig;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Serve until interrupted.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr = self.socket_addr()?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("cardroom API listening on http://{}", addr);
        self.log_endpoints();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    fn create_app(&self) -> axum::Router {
        create_router(self.state.clone())
            // Request ID first so every later layer can see it.
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS before timeout so preflights are handled.
            .layer(create_cors_layer(self.config.cors_origins.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.listen_address.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }

    fn log_endpoints(&self) {
        info!("available endpoints:");
        info!("  GET  /health                              - health check");
        info!("  POST /api/wallet/open                     - open wallet (initial grant)");
        info!("  GET  /api/wallet                          - balance and accumulators");
        info!("  GET  /api/wallet/transactions             - ledger history");
        info!("  POST /api/wallet/deposit                  - add chips");
        info!("  GET  /api/wallet/audit                    - conservation check");
        info!("  GET  /api/cards/shop                      - catalog");
        info!("  GET  /api/cards/pocket                    - owned cards");
        info!("  POST /api/cards/purchase                  - buy a card");
        info!("  GET  /api/betting/tables                  - list tables");
        info!("  POST /api/betting/tables                  - open a table");
        info!("  POST /api/betting/bets                    - place a wager");
        info!("  GET  /api/betting/bets                    - my bets");
        info!("  POST /api/betting/tables/:id/settle       - settle a table");
        info!("  GET  /api/leaderboard                     - rankings");
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        _ = terminate => {
            info!("received terminate signal");
        },
    }
}
