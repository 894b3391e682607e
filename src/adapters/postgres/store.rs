//! PostgreSQL implementation of TransactionalStore and OutboxStore.
//!
//! Entity rows and outbox rows for one commit are written in a single sqlx
//! transaction. Updates carry the expected version in the `WHERE` clause;
//! zero affected rows means someone else committed first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, EventId, Timestamp, TransactionId};
use crate::domain::outbox::OutboxMessage;
use crate::ports::{
    ChangeKind, ChangeSet, CommitReceipt, EntityChange, OutboxStore, StoreError,
    TransactionalStore,
};

/// Postgres SQLSTATE for a serialization failure under concurrent writes.
const SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL implementation of the storage ports used by the unit of work
/// and the dispatcher.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgresStore.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        let mut receipt = CommitReceipt::default();

        for change in &changes.entities {
            write_entity(&mut tx, change).await?;
            receipt.entities_written += 1;
        }

        for message in &changes.messages {
            let result = sqlx::query(
                r#"
                INSERT INTO outbox_messages (
                    id, event_type, payload, aggregate_type, aggregate_id,
                    transaction_id, created_at, processed_at, retry_count, last_error
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, 0, NULL)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(message.id.as_uuid())
            .bind(&message.event_type)
            .bind(&message.payload)
            .bind(&message.aggregate_type)
            .bind(&message.aggregate_id)
            .bind(message.transaction_id.as_uuid())
            .bind(message.created_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to insert outbox message", e))?;

            receipt.messages_written += result.rows_affected() as usize;
        }

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit transaction", e))?;

        tracing::debug!(
            transaction_id = %changes.transaction_id,
            entities = receipt.entities_written,
            messages = receipt.messages_written,
            "Committed change set"
        );

        Ok(receipt)
    }
}

async fn write_entity(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    change: &EntityChange,
) -> Result<(), StoreError> {
    let next_version = version_to_db(change.next_version())?;

    match change.kind {
        ChangeKind::Insert => {
            sqlx::query(
                r#"
                INSERT INTO entity_rows (entity_type, entity_id, version, state)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&change.entity_type)
            .bind(&change.entity_id)
            .bind(next_version)
            .bind(&change.state)
            .execute(&mut **tx)
            .await
            .map_err(|e| store_error("Failed to insert entity", e))?;
        }
        ChangeKind::Update { expected_version } => {
            let result = sqlx::query(
                r#"
                UPDATE entity_rows SET
                    version = $3,
                    state = $4,
                    updated_at = NOW()
                WHERE entity_type = $1 AND entity_id = $2 AND version = $5
                "#,
            )
            .bind(&change.entity_type)
            .bind(&change.entity_id)
            .bind(next_version)
            .bind(&change.state)
            .bind(version_to_db(expected_version)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| store_error("Failed to update entity", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Concurrency {
                    entity_type: change.entity_type.clone(),
                    entity_id: change.entity_id.clone(),
                    reason: format!("expected version {} not found", expected_version),
                });
            }
        }
    }

    Ok(())
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn fetch_unprocessed(
        &self,
        limit: u32,
        max_attempts: Option<u32>,
    ) -> Result<Vec<OutboxMessage>, DomainError> {
        let max_attempts = max_attempts.map(|m| i32::try_from(m).unwrap_or(i32::MAX));

        let rows = sqlx::query(
            r#"
            SELECT id, event_type, payload, aggregate_type, aggregate_id,
                   transaction_id, created_at, processed_at, retry_count, last_error
            FROM outbox_messages
            WHERE processed_at IS NULL
              AND ($2::INTEGER IS NULL OR retry_count < $2)
            ORDER BY created_at, seq
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch outbox messages", e))?;

        rows.into_iter().map(row_to_message).collect()
    }

    async fn mark_processed(&self, id: EventId, at: Timestamp) -> Result<(), DomainError> {
        // COALESCE keeps the first completion time if two dispatchers race.
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET processed_at = COALESCE(processed_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to mark outbox message processed", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn record_failure(&self, id: EventId, error: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET retry_count = retry_count + 1,
                last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to record outbox failure", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn find(&self, id: EventId) -> Result<Option<OutboxMessage>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, event_type, payload, aggregate_type, aggregate_id,
                   transaction_id, created_at, processed_at, retry_count, last_error
            FROM outbox_messages
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch outbox message", e))?;

        row.map(row_to_message).transpose()
    }
}

fn row_to_message(row: PgRow) -> Result<OutboxMessage, DomainError> {
    let decode = |e: sqlx::Error| DomainError::database("Failed to decode outbox row", e);

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let transaction_id: Uuid = row.try_get("transaction_id").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let processed_at: Option<DateTime<Utc>> = row.try_get("processed_at").map_err(decode)?;
    let payload: JsonValue = row.try_get("payload").map_err(decode)?;
    let retry_count: i32 = row.try_get("retry_count").map_err(decode)?;

    Ok(OutboxMessage {
        id: EventId::from_uuid(id),
        event_type: row.try_get("event_type").map_err(decode)?,
        payload,
        aggregate_type: row.try_get("aggregate_type").map_err(decode)?,
        aggregate_id: row.try_get("aggregate_id").map_err(decode)?,
        transaction_id: TransactionId::from_uuid(transaction_id),
        created_at: Timestamp::from_datetime(created_at),
        processed_at: processed_at.map(Timestamp::from_datetime),
        retry_count: u32::try_from(retry_count).unwrap_or(0),
        last_error: row.try_get("last_error").map_err(decode)?,
    })
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Internal(format!("Version {} out of range", version)))
}

fn not_found(id: EventId) -> DomainError {
    DomainError::new(
        ErrorCode::MessageNotFound,
        format!("Outbox message not found: {}", id),
    )
}

/// Classifies a sqlx error for the unit of work.
pub(crate) fn store_error(context: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(SERIALIZATION_FAILURE) => {
            StoreError::Concurrency {
                entity_type: String::new(),
                entity_id: String::new(),
                reason: format!("{}: {}", context, err),
            }
        }
        sqlx::Error::Database(_)
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Database(format!("{}: {}", context, err)),
        _ => StoreError::Internal(format!("{}: {}", context, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_database_errors() {
        let err = store_error("Failed to begin transaction", sqlx::Error::PoolTimedOut);

        match err {
            StoreError::Database(msg) => assert!(msg.starts_with("Failed to begin transaction")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_errors_are_internal() {
        let err = store_error("Failed to insert entity", sqlx::Error::RowNotFound);

        assert!(matches!(err, StoreError::Internal(_)));
    }

    #[test]
    fn huge_versions_are_rejected() {
        assert!(version_to_db(u64::MAX).is_err());
        assert_eq!(version_to_db(3).unwrap(), 3);
    }
}
