//! API Server
//!
//! HTTP server setup with the request-id, CORS, timeout and trace layers.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::{config::ApiConfig, services::LedgerServices};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// Router with the full middleware stack, shared by the server and tests
pub fn build_app(ledger: Arc<LedgerServices>, config: &ApiConfig) -> axum::Router {
    let state = Arc::new(AppState::new(ledger));

    create_router(state)
        // Request ID middleware (first for tracing)
        .layer(axum::middleware::from_fn(request_id_middleware))
        // CORS layer (before timeout to handle preflight)
        .layer(create_cors_layer(config.allowed_origins.clone()))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
}

pub struct ApiServer {
    config: ApiConfig,
    ledger: Arc<LedgerServices>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, ledger: Arc<LedgerServices>) -> Self {
        Self { config, ledger }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = build_app(self.ledger.clone(), &self.config);
        let addr = self.socket_addr()?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "Ledger API listening");
        self.log_server_info();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }

    fn log_server_info(&self) {
        info!(
            cors = ?self.config.allowed_origins,
            timeout_secs = self.config.request_timeout_secs,
            "Server configuration"
        );
        info!("Available endpoints:");
        info!("   GET  /health /metrics /status /results");
        info!("   POST /accounts    GET /accounts/:id[/history|/wagers]");
        info!("   POST /bets        GET /wagers/:id");
        info!("   POST /admin/topup /admin/withdraw /admin/settle /admin/close");
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
