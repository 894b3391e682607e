//! PgIdempotentHandler - Ledger insert and handler writes in one transaction.
//!
//! `IdempotentHandler` records the ledger row after the handler finished, so a
//! crash in between makes the next delivery run the handler again. When the
//! handler's own side effects live in the same PostgreSQL database, this
//! wrapper removes that window:
//!
//! 1. Begin a transaction
//! 2. Insert the ledger row with `ON CONFLICT DO NOTHING`
//! 3. Zero rows inserted: already handled, roll back and return Ok
//! 4. Run the handler on the same connection
//! 5. Commit; any failure rolls back the ledger row together with the
//!    handler's writes
//!
//! A concurrent delivery of the same message blocks on the ledger key until
//! the first transaction finishes, then sees the row and skips.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::domain::foundation::{DomainError, TypedEvent};
use crate::ports::EventHandler;

/// Handler whose writes go through the caller's transaction.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl TransactionalEventHandler<OrderPlaced> for ReserveStock {
///     async fn handle(&self, event: &OrderPlaced, conn: &mut PgConnection) -> Result<(), DomainError> {
///         sqlx::query("UPDATE stock SET reserved = reserved + $2 WHERE sku = $1")
///             .bind(&event.sku)
///             .bind(event.quantity)
///             .execute(conn)
///             .await
///             .map_err(|e| DomainError::database("Failed to reserve stock", e))?;
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "ReserveStock"
///     }
/// }
/// ```
#[async_trait]
pub trait TransactionalEventHandler<E: TypedEvent>: Send + Sync {
    /// Process an event using `conn`, which is inside an open transaction.
    async fn handle(&self, event: &E, conn: &mut PgConnection) -> Result<(), DomainError>;

    /// Stable consumer name for the ledger.
    fn name(&self) -> &'static str;
}

/// Wrapper that makes a `TransactionalEventHandler` effectively-once.
pub struct PgIdempotentHandler<H> {
    inner: H,
    pool: PgPool,
}

impl<H> PgIdempotentHandler<H> {
    pub fn new(inner: H, pool: PgPool) -> Self {
        Self { inner, pool }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<E, H> EventHandler<E> for PgIdempotentHandler<H>
where
    E: TypedEvent,
    H: TransactionalEventHandler<E> + 'static,
{
    async fn handle(&self, event: &E) -> Result<(), DomainError> {
        let consumer = self.inner.name();
        let message_id = event.event_id();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO outbox_message_consumers (message_id, consumer_name, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (message_id, consumer_name) DO NOTHING
            "#,
        )
        .bind(message_id.as_uuid())
        .bind(consumer)
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::database("Failed to record consumer", e))?
        .rows_affected();

        if inserted == 0 {
            tx.rollback()
                .await
                .map_err(|e| DomainError::database("Failed to roll back transaction", e))?;
            tracing::debug!(
                event_id = %message_id,
                handler = consumer,
                "Skipping already handled event"
            );
            return Ok(());
        }

        // Dropping `tx` on error rolls back the ledger row too.
        self.inner.handle(event, &mut tx).await?;

        tx.commit()
            .await
            .map_err(|e| DomainError::database("Failed to commit transaction", e))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
