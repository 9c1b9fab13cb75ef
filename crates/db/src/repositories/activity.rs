use sqlx::Row;

use edara_core::domain::ticket::{TicketActivity, TicketId};

use super::{decode_err, parse_timestamp, RepositoryError, TicketActivityRepository};
use crate::DbPool;

pub struct SqlTicketActivityRepository {
    pool: DbPool,
}

impl SqlTicketActivityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_activity(row: &sqlx::sqlite::SqliteRow) -> Result<TicketActivity, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let ticket_id: String = row.try_get("ticket_id").map_err(decode_err)?;
    let action: String = row.try_get("action").map_err(decode_err)?;
    let actor: String = row.try_get("actor").map_err(decode_err)?;
    let detail: String = row.try_get("detail").map_err(decode_err)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(TicketActivity {
        id,
        ticket_id: TicketId(ticket_id),
        action,
        actor,
        detail,
        created_at: parse_timestamp("created_at", &created_at_str)?,
    })
}

#[async_trait::async_trait]
impl TicketActivityRepository for SqlTicketActivityRepository {
    async fn append(&self, activity: TicketActivity) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ticket_activity (id, ticket_id, action, actor, detail, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&activity.id)
        .bind(&activity.ticket_id.0)
        .bind(&activity.action)
        .bind(&activity.actor)
        .bind(&activity.detail)
        .bind(activity.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_ticket(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<TicketActivity>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, ticket_id, action, actor, detail, created_at
             FROM ticket_activity
             WHERE ticket_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&ticket_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_activity).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use edara_core::domain::department::DepartmentId;
    use edara_core::domain::ticket::{NewTicket, Ticket, TicketActivity, TicketId};

    use super::SqlTicketActivityRepository;
    use crate::repositories::{SqlTicketRepository, TicketActivityRepository, TicketRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn seed_ticket(pool: &sqlx::SqlitePool) -> TicketId {
        let ticket = Ticket::submit(
            NewTicket {
                department_id: DepartmentId("DEP-1".to_string()),
                title: "Laptop".to_string(),
                description: String::new(),
                created_by: "user-1".to_string(),
                is_purchase_ticket: false,
                purchase_amount: None,
            },
            Utc::now(),
        )
        .expect("submit");
        let id = ticket.id.clone();
        SqlTicketRepository::new(pool.clone()).save(ticket).await.expect("save ticket");
        id
    }

    #[tokio::test]
    async fn activity_is_listed_oldest_first() {
        let pool = setup().await;
        let ticket_id = seed_ticket(&pool).await;
        let repo = SqlTicketActivityRepository::new(pool);
        let start = Utc::now();

        repo.append(TicketActivity::new(&ticket_id, "approve", "admin-2", "order 1 -> 2", start))
            .await
            .expect("append");
        repo.append(TicketActivity::new(
            &ticket_id,
            "created",
            "user-1",
            "",
            start - Duration::minutes(5),
        ))
        .await
        .expect("append");

        let activity = repo.list_for_ticket(&ticket_id).await.expect("list");
        let actions: Vec<&str> = activity.iter().map(|entry| entry.action.as_str()).collect();
        assert_eq!(actions, vec!["created", "approve"]);
    }

    #[tokio::test]
    async fn activity_requires_existing_ticket() {
        let repo = SqlTicketActivityRepository::new(setup().await);
        let orphan = TicketActivity::new(
            &TicketId("TKT-MISSING".to_string()),
            "approve",
            "admin-1",
            "",
            Utc::now(),
        );

        assert!(repo.append(orphan).await.is_err());
    }
}
