use edara_core::audit::AuditEvent;

use super::{AuditEventRepository, RepositoryError};
use crate::DbPool;

/// Append-only store for audit events; metadata lands in `payload_json`.
pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&event.metadata)
            .map_err(|error| RepositoryError::Decode(format!("payload_json: {error}")))?;

        sqlx::query(
            "INSERT INTO audit_event (id, timestamp, actor, ticket_id, correlation_id,
                                      event_type, event_category, outcome, payload_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.occurred_at.to_rfc3339())
        .bind(&event.actor)
        .bind(event.ticket_id.as_ref().map(|id| id.0.as_str()))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(event.outcome.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
