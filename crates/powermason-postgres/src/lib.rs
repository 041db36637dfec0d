//! PostgreSQL adapter for Powermason.
//!
//! [`PgStore`] implements [`powermason_core::ports::ProjectStore`] and
//! [`PgNotifier`] implements [`powermason_core::ports::Notifier`]. The
//! schema lives in `migrations/` and is applied with [`migrate`].

pub mod config;
pub mod notifier;
mod sqlx_types;
pub mod store;

pub use config::{mask_database_url, DatabaseConfig};
pub use notifier::PgNotifier;
pub use store::PgStore;

use sqlx::PgPool;

/// Apply pending migrations from `migrations/`.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("powermason schema is up to date");
    Ok(())
}
