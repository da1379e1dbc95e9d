// src/main.rs
mod api;
mod config;
mod model;
mod optimizer;
mod orchestrator;
mod repository;
mod store;
mod types;

use config::AppConfig;
use optimizer::FirstFitDecreasing;
use orchestrator::OrderPackingService;
use store::SqliteStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initializes logging. `RUST_LOG` controls the verbosity and defaults to `info`.
fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Loaded before tracing so RUST_LOG from .env applies.
    let dotenv_result = dotenvy::dotenv();
    setup_tracing();
    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();

    info!("🚀 Box packing service starting...");

    let store = match SqliteStore::connect(&app_config.database).await {
        Ok(store) => store,
        Err(err) => {
            error!(url = app_config.database.url(), error = %err, "could not open database");
            std::process::exit(1);
        }
    };

    if app_config.database.run_migrations() {
        if let Err(err) = store.migrate().await {
            error!(error = %err, "could not apply migrations");
            std::process::exit(1);
        }
        info!("🗄️ Database schema is up to date");
    }

    let service = OrderPackingService::new(store, FirstFitDecreasing);
    if let Err(err) = api::start_api_server(app_config.api, service).await {
        error!(error = %err, "API server stopped");
        std::process::exit(1);
    }
}
