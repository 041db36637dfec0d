//! powermason-server: REST server for the Powermason project ledger.
//!
//! Reads config from env vars (optionally via `.env`); see
//! [`powermason_server::config`] and [`powermason_postgres::DatabaseConfig`].

use std::sync::Arc;

use powermason_core::files::LocalFileStore;
use powermason_core::memory::MemoryStore;
use powermason_core::ports::{Notifier, ProjectStore};
use powermason_core::ProjectService;
use powermason_postgres::{migrate, DatabaseConfig, PgNotifier, PgStore};
use powermason_server::config::{ServerConfig, StoreKind};
use powermason_server::middleware::jwt::JwtConfig;
use powermason_server::router::build_router;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,powermason_server=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env().unwrap_or_else(|e| panic!("invalid configuration: {e}"));

    // Build port implementations
    let (store, notifier): (Arc<dyn ProjectStore>, Arc<dyn Notifier>) = match config.store {
        StoreKind::Postgres => {
            let pool = DatabaseConfig::default()
                .connect()
                .await
                .expect("failed to connect to database");
            migrate(&pool).await.expect("failed to apply migrations");
            tracing::info!("Connected to database");
            let store: Arc<dyn ProjectStore> = Arc::new(PgStore::new(pool.clone()));
            let notifier: Arc<dyn Notifier> = Arc::new(PgNotifier::new(pool));
            (store, notifier)
        }
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store; data is lost on restart");
            let memory = Arc::new(MemoryStore::new());
            let store: Arc<dyn ProjectStore> = memory.clone();
            let notifier: Arc<dyn Notifier> = memory;
            (store, notifier)
        }
    };
    let files = Arc::new(LocalFileStore::new(&config.media_root));
    tracing::info!(media_root = %config.media_root.display(), "file store ready");

    let service = Arc::new(ProjectService::new(store, files, notifier));

    // Build router
    let jwt_config = JwtConfig::from_secret(config.jwt_secret.as_bytes());
    let app = build_router(service, jwt_config);

    // Bind and serve
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {}: {e}", config.bind_addr));
    tracing::info!("powermason-server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
