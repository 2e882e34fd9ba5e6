//! loyalty_ledger - Loyalty Points Backend
//!
//! Accepts purchase orders, reconciles them against the external accrual
//! service in the background and keeps a per-customer points ledger.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loyalty_ledger::accrual::AccrualClient;
use loyalty_ledger::api::{self, AppState};
use loyalty_ledger::config::StoreBackend;
use loyalty_ledger::db;
use loyalty_ledger::jobs::JobScheduler;
use loyalty_ledger::store::{MemoryStore, PgStore, Store};
use loyalty_ledger::Config;

const DEFAULT_LOG_FILTER: &str = "loyalty_ledger=debug,tower_http=debug";

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting loyalty_ledger server");

    match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;

            tracing::info!("Connecting to database...");
            let pool = db::connect(
                &database_url,
                config.database_max_connections,
                config.database_connect_attempts,
            )
            .await?;

            db::ensure_schema(&pool).await?;
            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            serve(Arc::new(PgStore::new(pool.clone())), &config, addr).await?;

            pool.close().await;
            tracing::info!("Database connections closed. Goodbye!");
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; all data is lost on exit");
            serve(Arc::new(MemoryStore::new()), &config, addr).await?;
        }
    }

    Ok(())
}

/// Run the HTTP server and the reconciliation scheduler until shutdown
async fn serve<S: Store>(store: Arc<S>, config: &Config, addr: SocketAddr) -> anyhow::Result<()> {
    let accrual = Arc::new(AccrualClient::new(config.accrual.clone())?);
    let scheduler =
        JobScheduler::with_config(store.clone(), accrual, config.scheduler.clone()).start();

    let state = AppState::new(store, config.order_checksum);
    let app = api::build_router(state, config.request_timeout);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("Server shutting down...");
    scheduler.abort();
    served?;

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
