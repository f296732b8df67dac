use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use thiserror::Error;

use crate::config::ConfigurationError;
use crate::config::StorageBackend;
use crate::config::StorageConfig;
use crate::domain::storage::errors::StorageError;
use crate::domain::storage::ports::StorageAdapter;

pub mod memory;
pub mod mongo;
pub mod mysql;
pub mod postgres;

pub use memory::InMemoryStorage;
pub use mongo::MongoStorage;
pub use mysql::MySqlStorage;
pub use postgres::PostgresStorage;

/// Error raised while building the storage adapter at start-up.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to connect to {backend}: {source}")]
    Connection {
        backend: StorageBackend,
        #[source]
        source: StorageError,
    },
}

/// Build the single storage adapter for this process.
///
/// Connection parameters of the selected backend are read once here;
/// the other backends' sections are ignored.
///
/// # Arguments
/// * `config` - Storage section of the configuration
///
/// # Returns
/// Connected adapter with its schema in place
///
/// # Errors
/// * `Configuration` - Unknown backend or a required parameter is missing
/// * `Connection` - The datastore could not be reached or migrated
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>, ConnectError> {
    let backend = config.backend()?;
    let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);
    let classify = |e: PoolError| match e {
        PoolError::Configuration(e) => ConnectError::Configuration(e),
        PoolError::Storage(source) => ConnectError::Connection { backend, source },
    };

    let adapter: Arc<dyn StorageAdapter> = match backend {
        StorageBackend::Postgres => Arc::new(
            PostgresStorage::connect(&config.postgres, config.max_connections, acquire_timeout)
                .await
                .map_err(classify)?,
        ),
        StorageBackend::MySql => Arc::new(
            MySqlStorage::connect(&config.mysql, config.max_connections, acquire_timeout)
                .await
                .map_err(classify)?,
        ),
        StorageBackend::Mongo => Arc::new(
            MongoStorage::connect(&config.mongo, config.max_connections, acquire_timeout)
                .await
                .map_err(classify)?,
        ),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(InMemoryStorage::new())
        }
    };

    tracing::info!(backend = %backend, "Storage adapter ready");

    Ok(adapter)
}

/// Error from a backend constructor: either its configuration or the
/// datastore itself.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::database(err)
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::database(err)
    }
}

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        StorageError::database(err)
    }
}

/// Fixed-width RFC 3339 form (microseconds, `Z`), so that lexicographic
/// order is chronological order.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(
    table: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(table, format!("timestamp {:?}: {}", value, e)))
}
