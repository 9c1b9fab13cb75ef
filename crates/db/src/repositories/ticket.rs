use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use edara_core::domain::department::DepartmentId;
use edara_core::domain::ticket::{Ticket, TicketId, TicketStatus};

use super::{decode_err, parse_timestamp, RepositoryError, TicketRepository};
use crate::DbPool;

const TICKET_COLUMNS: &str = "id, department_id, title, description, created_by, status,
    is_purchase_ticket, purchase_amount, next_admin_order, approved_at, rejected_at,
    rejection_reason, created_at, updated_at";

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let department_id: String = row.try_get("department_id").map_err(decode_err)?;
    let title: String = row.try_get("title").map_err(decode_err)?;
    let description: String = row.try_get("description").map_err(decode_err)?;
    let created_by: String = row.try_get("created_by").map_err(decode_err)?;
    let status_str: String = row.try_get("status").map_err(decode_err)?;
    let is_purchase_ticket: bool = row.try_get("is_purchase_ticket").map_err(decode_err)?;
    let purchase_amount_str: Option<String> =
        row.try_get("purchase_amount").map_err(decode_err)?;
    let next_admin_order: i64 = row.try_get("next_admin_order").map_err(decode_err)?;
    let approved_at_str: Option<String> = row.try_get("approved_at").map_err(decode_err)?;
    let rejected_at_str: Option<String> = row.try_get("rejected_at").map_err(decode_err)?;
    let rejection_reason: Option<String> = row.try_get("rejection_reason").map_err(decode_err)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode_err)?;

    let status = TicketStatus::from_str(&status_str).map_err(decode_err)?;
    let purchase_amount = purchase_amount_str
        .map(|value| Decimal::from_str(&value).map_err(decode_err))
        .transpose()?;
    let next_admin_order = u32::try_from(next_admin_order).map_err(decode_err)?;
    let approved_at =
        approved_at_str.map(|value| parse_timestamp("approved_at", &value)).transpose()?;
    let rejected_at =
        rejected_at_str.map(|value| parse_timestamp("rejected_at", &value)).transpose()?;

    Ok(Ticket {
        id: TicketId(id),
        department_id: DepartmentId(department_id),
        title,
        description,
        created_by,
        status,
        is_purchase_ticket,
        purchase_amount,
        next_admin_order,
        approved_at,
        rejected_at,
        rejection_reason,
        created_at: parse_timestamp("created_at", &created_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
    })
}

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_ticket(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ticket (id, department_id, title, description, created_by, status,
                                 is_purchase_ticket, purchase_amount, next_admin_order,
                                 approved_at, rejected_at, rejection_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 status = excluded.status,
                 is_purchase_ticket = excluded.is_purchase_ticket,
                 purchase_amount = excluded.purchase_amount,
                 next_admin_order = excluded.next_admin_order,
                 approved_at = excluded.approved_at,
                 rejected_at = excluded.rejected_at,
                 rejection_reason = excluded.rejection_reason,
                 updated_at = excluded.updated_at",
        )
        .bind(&ticket.id.0)
        .bind(&ticket.department_id.0)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(&ticket.created_by)
        .bind(ticket.status.as_str())
        .bind(ticket.is_purchase_ticket)
        .bind(ticket.purchase_amount.map(|amount| amount.to_string()))
        .bind(i64::from(ticket.next_admin_order))
        .bind(ticket.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(&ticket.rejection_reason)
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_transition(
        &self,
        ticket: &Ticket,
        from_status: TicketStatus,
        from_order: u32,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let advance = i64::from(ticket.next_admin_order) - i64::from(from_order);
        let row = sqlx::query(&format!(
            "UPDATE ticket SET
                 status = ?,
                 next_admin_order = next_admin_order + ?,
                 approved_at = ?,
                 rejected_at = ?,
                 rejection_reason = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket.status.as_str())
        .bind(advance)
        .bind(ticket.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(ticket.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(&ticket.rejection_reason)
        .bind(ticket.updated_at.to_rfc3339())
        .bind(&ticket.id.0)
        .bind(from_status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_ticket).transpose()
    }

    async fn list_pending(
        &self,
        department_id: &DepartmentId,
        limit: u32,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket
             WHERE department_id = ? AND status = 'pending'
             ORDER BY created_at ASC
             LIMIT ?"
        ))
        .bind(&department_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_ticket).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use edara_core::domain::department::DepartmentId;
    use edara_core::domain::ticket::{NewTicket, Ticket, TicketId, TicketStatus};

    use super::SqlTicketRepository;
    use crate::repositories::TicketRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_ticket(department: &str, is_purchase: bool) -> Ticket {
        Ticket::submit(
            NewTicket {
                department_id: DepartmentId(department.to_string()),
                title: "Printer toner".to_string(),
                description: "Two cartridges".to_string(),
                created_by: "user-3".to_string(),
                is_purchase_ticket: is_purchase,
                purchase_amount: is_purchase.then(|| Decimal::new(34_950, 2)),
            },
            Utc::now(),
        )
        .expect("submit")
    }

    #[tokio::test]
    async fn save_and_find_by_id() {
        let repo = SqlTicketRepository::new(setup().await);
        let ticket = sample_ticket("DEP-1", true);

        repo.save(ticket.clone()).await.expect("save");
        let found = repo.find_by_id(&ticket.id).await.expect("find").expect("should exist");

        assert_eq!(found.id, ticket.id);
        assert_eq!(found.status, TicketStatus::Pending);
        assert!(found.is_purchase_ticket);
        assert_eq!(found.purchase_amount, Some(Decimal::new(34_950, 2)));
        assert_eq!(found.next_admin_order, 0);
    }

    #[tokio::test]
    async fn find_missing_ticket_returns_none() {
        let repo = SqlTicketRepository::new(setup().await);
        let found = repo.find_by_id(&TicketId("TKT-NOPE".to_string())).await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn save_upserts_approval_progress() {
        let repo = SqlTicketRepository::new(setup().await);
        let ticket = sample_ticket("DEP-1", false);
        repo.save(ticket.clone()).await.expect("save");

        let now = Utc::now();
        let mut approved = ticket.clone();
        approved.next_admin_order = 2;
        approved.status = TicketStatus::Approved;
        approved.approved_at = Some(now);
        approved.updated_at = now;
        repo.save(approved).await.expect("upsert");

        let found = repo.find_by_id(&ticket.id).await.expect("find").expect("exists");
        assert_eq!(found.status, TicketStatus::Approved);
        assert_eq!(found.next_admin_order, 2);
        assert_eq!(
            found.approved_at.map(|dt| dt.timestamp_micros()),
            Some(now.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn transition_is_refused_once_the_stored_ticket_is_decided() {
        let repo = SqlTicketRepository::new(setup().await);
        let ticket = sample_ticket("DEP-1", false);
        repo.save(ticket.clone()).await.expect("save");

        let mut rejected = ticket.clone();
        rejected.status = TicketStatus::Rejected;
        rejected.rejected_at = Some(Utc::now());
        rejected.rejection_reason = Some("duplicate".to_string());
        let stored = repo
            .save_transition(&rejected, TicketStatus::Pending, 0)
            .await
            .expect("reject")
            .expect("pending row matches");
        assert_eq!(stored.status, TicketStatus::Rejected);

        let mut stale_approval = ticket.clone();
        stale_approval.next_admin_order = 1;
        let refused = repo
            .save_transition(&stale_approval, TicketStatus::Pending, 0)
            .await
            .expect("query runs");
        assert!(refused.is_none());

        let found = repo.find_by_id(&ticket.id).await.expect("find").expect("exists");
        assert_eq!(found.status, TicketStatus::Rejected);
        assert_eq!(found.next_admin_order, 0);
        assert_eq!(found.rejection_reason.as_deref(), Some("duplicate"));
    }

    #[tokio::test]
    async fn transition_advances_relative_to_the_stored_order() {
        let repo = SqlTicketRepository::new(setup().await);
        let ticket = sample_ticket("DEP-1", false);
        repo.save(ticket.clone()).await.expect("save");

        let mut approval = ticket.clone();
        approval.next_admin_order = 1;
        for expected in [1, 2] {
            let stored = repo
                .save_transition(&approval, TicketStatus::Pending, 0)
                .await
                .expect("approve")
                .expect("still pending");
            assert_eq!(stored.next_admin_order, expected);
        }
    }

    #[tokio::test]
    async fn list_pending_filters_by_department_and_status() {
        let repo = SqlTicketRepository::new(setup().await);

        repo.save(sample_ticket("DEP-1", false)).await.expect("save 1");
        repo.save(sample_ticket("DEP-1", true)).await.expect("save 2");
        repo.save(sample_ticket("DEP-2", false)).await.expect("save 3");
        let mut rejected = sample_ticket("DEP-1", false);
        rejected.status = TicketStatus::Rejected;
        repo.save(rejected).await.expect("save 4");

        let pending =
            repo.list_pending(&DepartmentId("DEP-1".to_string()), 100).await.expect("list");
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|ticket| ticket.status == TicketStatus::Pending));
    }
}
