use std::collections::HashMap;

use tokio::sync::RwLock;

use edara_core::audit::AuditEvent;
use edara_core::domain::department::{DepartmentAdmin, DepartmentId};
use edara_core::domain::ticket::{Ticket, TicketActivity, TicketId, TicketStatus};

use super::{
    AuditEventRepository, DepartmentAdminRepository, RepositoryError, TicketActivityRepository,
    TicketRepository,
};

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<String, Ticket>>,
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(&id.0).cloned())
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id.0.clone(), ticket);
        Ok(())
    }

    async fn save_transition(
        &self,
        ticket: &Ticket,
        from_status: TicketStatus,
        from_order: u32,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let mut tickets = self.tickets.write().await;
        let Some(stored) = tickets.get_mut(&ticket.id.0).filter(|t| t.status == from_status)
        else {
            return Ok(None);
        };

        let advance = ticket.next_admin_order.saturating_sub(from_order);
        stored.status = ticket.status;
        stored.next_admin_order = stored.next_admin_order.saturating_add(advance);
        stored.approved_at = ticket.approved_at;
        stored.rejected_at = ticket.rejected_at;
        stored.rejection_reason = ticket.rejection_reason.clone();
        stored.updated_at = ticket.updated_at;
        Ok(Some(stored.clone()))
    }

    async fn list_pending(
        &self,
        department_id: &DepartmentId,
        limit: u32,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        let mut pending: Vec<Ticket> = tickets
            .values()
            .filter(|ticket| &ticket.department_id == department_id && ticket.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit as usize);
        Ok(pending)
    }
}

/// Keyed by `(department_id, user_id)`, matching the SQL primary key.
#[derive(Default)]
pub struct InMemoryDepartmentAdminRepository {
    admins: RwLock<HashMap<(String, String), DepartmentAdmin>>,
}

fn roster_order(admins: &mut [DepartmentAdmin]) {
    admins.sort_by(|a, b| {
        (a.admin_order, a.is_purchase_admin, &a.user_id).cmp(&(
            b.admin_order,
            b.is_purchase_admin,
            &b.user_id,
        ))
    });
}

#[async_trait::async_trait]
impl DepartmentAdminRepository for InMemoryDepartmentAdminRepository {
    async fn list_for_department(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Vec<DepartmentAdmin>, RepositoryError> {
        let admins = self.admins.read().await;
        let mut roster: Vec<DepartmentAdmin> = admins
            .values()
            .filter(|admin| &admin.department_id == department_id)
            .cloned()
            .collect();
        roster_order(&mut roster);
        Ok(roster)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<DepartmentAdmin>, RepositoryError> {
        let admins = self.admins.read().await;
        let mut memberships: Vec<DepartmentAdmin> =
            admins.values().filter(|admin| admin.user_id == user_id).cloned().collect();
        memberships.sort_by(|a, b| a.department_id.cmp(&b.department_id));
        Ok(memberships)
    }

    async fn save(&self, admin: DepartmentAdmin) -> Result<(), RepositoryError> {
        let mut admins = self.admins.write().await;
        admins.insert((admin.department_id.0.clone(), admin.user_id.clone()), admin);
        Ok(())
    }

    async fn remove(
        &self,
        department_id: &DepartmentId,
        user_id: &str,
    ) -> Result<bool, RepositoryError> {
        let mut admins = self.admins.write().await;
        Ok(admins.remove(&(department_id.0.clone(), user_id.to_string())).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryTicketActivityRepository {
    entries: RwLock<Vec<TicketActivity>>,
}

#[async_trait::async_trait]
impl TicketActivityRepository for InMemoryTicketActivityRepository {
    async fn append(&self, activity: TicketActivity) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.push(activity);
        Ok(())
    }

    async fn list_for_ticket(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<TicketActivity>, RepositoryError> {
        let entries = self.entries.read().await;
        let mut activity: Vec<TicketActivity> =
            entries.iter().filter(|entry| &entry.ticket_id == ticket_id).cloned().collect();
        activity.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(activity)
    }
}

#[derive(Default)]
pub struct InMemoryAuditEventRepository {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditEventRepository {
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait::async_trait]
impl AuditEventRepository for InMemoryAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use edara_core::domain::department::{DepartmentAdmin, DepartmentId};
    use edara_core::domain::ticket::{NewTicket, Ticket, TicketActivity, TicketStatus};

    use crate::repositories::{
        DepartmentAdminRepository, InMemoryDepartmentAdminRepository,
        InMemoryTicketActivityRepository, InMemoryTicketRepository, TicketActivityRepository,
        TicketRepository,
    };

    fn ticket(department: &str) -> Ticket {
        Ticket::submit(
            NewTicket {
                department_id: DepartmentId(department.to_string()),
                title: "Chairs".to_string(),
                description: String::new(),
                created_by: "user-1".to_string(),
                is_purchase_ticket: false,
                purchase_amount: None,
            },
            Utc::now(),
        )
        .expect("submit")
    }

    #[tokio::test]
    async fn in_memory_ticket_repo_round_trip() {
        let repo = InMemoryTicketRepository::default();
        let mut stored = ticket("DEP-1");
        repo.save(stored.clone()).await.expect("save");

        stored.status = TicketStatus::Rejected;
        repo.save(stored.clone()).await.expect("overwrite");

        let found = repo.find_by_id(&stored.id).await.expect("find").expect("exists");
        assert_eq!(found.status, TicketStatus::Rejected);
        assert!(repo
            .list_pending(&DepartmentId("DEP-1".to_string()), 10)
            .await
            .expect("list")
            .is_empty());
    }

    #[tokio::test]
    async fn in_memory_roster_matches_sql_ordering() {
        let repo = InMemoryDepartmentAdminRepository::default();
        let dept = DepartmentId("DEP-1".to_string());
        repo.save(DepartmentAdmin::purchase(&dept, "buyer", 0)).await.expect("save");
        repo.save(DepartmentAdmin::regular(&dept, "zed", 0)).await.expect("save");
        repo.save(DepartmentAdmin::regular(&dept, "amy", 1)).await.expect("save");

        let roster = repo.list_for_department(&dept).await.expect("list");
        let users: Vec<&str> = roster.iter().map(|admin| admin.user_id.as_str()).collect();
        assert_eq!(users, vec!["zed", "buyer", "amy"]);

        assert!(repo.remove(&dept, "zed").await.expect("remove"));
        assert_eq!(repo.list_for_user("zed").await.expect("list").len(), 0);
    }

    #[tokio::test]
    async fn in_memory_activity_filters_by_ticket() {
        let repo = InMemoryTicketActivityRepository::default();
        let first = ticket("DEP-1");
        let second = ticket("DEP-1");
        repo.append(TicketActivity::new(&first.id, "created", "user-1", "", Utc::now()))
            .await
            .expect("append");
        repo.append(TicketActivity::new(&second.id, "created", "user-1", "", Utc::now()))
            .await
            .expect("append");

        assert_eq!(repo.list_for_ticket(&first.id).await.expect("list").len(), 1);
    }
}
