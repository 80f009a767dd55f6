//! Storage module for the API.
//!
//! Provides the SQLite CORS origin store, the identity directory, and the
//! generic configuration manager used by the legacy URL store.

pub mod configuration;
pub mod cors_configuration_store;
pub mod directory;
pub mod error;
pub mod sqlite;
pub mod traits;

pub use configuration::{ConfigurationError, ConfigurationManager, SqliteConfigurationManager};
pub use cors_configuration_store::ConfigurationBackedCorsConfigurationStore;
pub use directory::SqliteIdentityDirectory;
pub use error::{StorageError, StoreOperation};
pub use sqlite::SqliteCorsOriginStore;
pub use traits::{
    ApplicationResolver, CorsConfigurationStore, CorsOriginStore, Prioritized, TenantResolver,
};

use crate::config::CorsSettings;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::info;

/// Open the pool described by `settings` and apply pending migrations.
pub async fn connect(settings: &CorsSettings) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(&settings.database_url)
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(settings.max_connections);
    if settings.database_url.contains(":memory:") {
        // An in-memory database lives only as long as its connection.
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
    info!("Connected to database {}", settings.database_url);

    migrate(&pool).await?;
    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StorageError::Other(format!("Failed to run migrations: {}", e)))?;
    info!("Database migrations completed");
    Ok(())
}

/// Begin a transaction holding the write lock from its first statement.
///
/// A deferred transaction that reads before it writes cannot wait for the
/// lock once another writer has committed; SQLite fails it with `SQLITE_BUSY`
/// instead. `BEGIN IMMEDIATE` makes concurrent writers queue on the busy
/// timeout.
pub(crate) async fn begin_write(
    pool: &SqlitePool,
) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}
