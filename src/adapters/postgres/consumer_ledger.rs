//! PostgreSQL implementation of ConsumerLedger.
//!
//! The `(message_id, consumer_name)` primary key makes concurrent inserts
//! race-safe: the loser gets zero affected rows, reported as
//! `AlreadyRecorded`.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, EventId};
use crate::ports::{ConsumerLedger, LedgerInsert};

/// PostgreSQL implementation of ConsumerLedger.
#[derive(Clone)]
pub struct PostgresConsumerLedger {
    pool: PgPool,
}

impl PostgresConsumerLedger {
    /// Creates a new PostgresConsumerLedger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConsumerLedger for PostgresConsumerLedger {
    async fn contains(&self, message_id: EventId, consumer: &str) -> Result<bool, DomainError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM outbox_message_consumers
                WHERE message_id = $1 AND consumer_name = $2
            )
            "#,
        )
        .bind(message_id.as_uuid())
        .bind(consumer)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to check consumer ledger", e))?;

        Ok(exists)
    }

    async fn record(
        &self,
        message_id: EventId,
        consumer: &str,
    ) -> Result<LedgerInsert, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO outbox_message_consumers (message_id, consumer_name, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (message_id, consumer_name) DO NOTHING
            "#,
        )
        .bind(message_id.as_uuid())
        .bind(consumer)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to record consumer", e))?;

        Ok(if result.rows_affected() == 0 {
            LedgerInsert::AlreadyRecorded
        } else {
            LedgerInsert::Inserted
        })
    }
}
