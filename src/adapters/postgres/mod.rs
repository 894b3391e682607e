//! PostgreSQL adapters - Database implementations for the storage ports.
//!
//! - `PostgresStore` - Atomic entity + outbox writes, dispatcher queries
//! - `PostgresConsumerLedger` - Idempotency ledger
//! - `PgIdempotentHandler` - Ledger insert and handler writes in one transaction
//!
//! Schema lives in `migrations/`; see [`run_migrations`].

mod consumer_ledger;
mod idempotent_handler;
mod store;

pub use consumer_ledger::PostgresConsumerLedger;
pub use idempotent_handler::{PgIdempotentHandler, TransactionalEventHandler};
pub use store::PostgresStore;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::domain::foundation::DomainError;

/// Opens a connection pool shaped by `config`, applying migrations first
/// when `run_migrations` is set.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(connect_options(config)?)
        .await
        .map_err(|e| DomainError::database("Failed to connect to database", e))?;

    if config.run_migrations {
        run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// Parses the URL and sets the per-session `statement_timeout`.
fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, DomainError> {
    let options: PgConnectOptions = config
        .url
        .parse()
        .map_err(|e| DomainError::database("Invalid database URL", e))?;

    Ok(match config.statement_timeout() {
        Some(timeout) => options.options([("statement_timeout", timeout.as_millis().to_string())]),
        None => options,
    })
}

/// Applies the bundled outbox schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::database("Failed to run migrations", e))?;

    tracing::info!("Outbox schema migrations applied");
    Ok(())
}
