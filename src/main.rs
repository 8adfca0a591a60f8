//! 2D ledger API server binary

use clap::Parser;
use std::sync::Arc;
use twod_ledger::{
    api::ApiServer,
    config::{LedgerConfig, StoreBackend},
    ConfigLoader, LedgerServices,
};

#[derive(Parser, Debug)]
#[command(name = "twod-ledger")]
#[command(about = "2D lottery ledger API server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Start from the development preset (in-memory store, debug logging)
    #[arg(long)]
    dev: bool,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,
}

impl Args {
    fn load_config(&self) -> Result<LedgerConfig, Box<dyn std::error::Error>> {
        let mut config = if self.dev {
            LedgerConfig::development()
        } else {
            match &self.config {
                Some(path) => ConfigLoader::new().with_path(path).load()?,
                None => ConfigLoader::new().load()?,
            }
        };

        if let Some(host) = &self.host {
            config.api.host = host.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(path) = &self.db_path {
            config.storage.data_directory = path.clone();
            config.storage.backend = StoreBackend::Rocks;
        }
        if let Some(origins) = &self.cors_origins {
            config.api.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = args.load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_filter.clone().into()),
        )
        .init();

    tracing::info!(
        backend = ?config.storage.backend,
        data_directory = %config.storage.data_directory,
        "Starting 2D ledger"
    );

    let ledger = Arc::new(LedgerServices::open(config)?);
    let api_config = ledger.config().api.clone();
    let now = chrono::Utc::now();
    let status = ledger.game_status(now)?;
    tracing::info!(
        session = %status.current_session,
        open = status.is_open,
        manually_closed = status.is_manually_closed,
        "Game status at startup"
    );

    ApiServer::new(api_config, ledger).run().await
}
