//! Ticket operations shared by the JSON API and the emailed action links.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use edara_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, InMemoryAuditSink};
use edara_core::{
    ApplicationError, ApprovalRoster, DepartmentId, DomainError, NewTicket, SideEffect, Ticket,
    TicketAction, TicketId, TicketStatus, TransitionOutcome,
};
use edara_db::repositories::RepositoryError;

use crate::dispatch;
use crate::state::AppState;

/// Upper bound on pending tickets scanned per department for an approver inbox.
const PENDING_SCAN_LIMIT: u32 = 500;

#[derive(Clone, Debug, Serialize)]
pub struct TicketView {
    pub ticket: Ticket,
    pub eligible_approvers: Vec<String>,
    pub stalled: bool,
}

impl TicketView {
    pub fn new(ticket: Ticket, roster: &ApprovalRoster) -> Self {
        let eligible_approvers =
            roster.eligible_approvers(&ticket).iter().map(|admin| admin.user_id.clone()).collect();
        let stalled = roster.is_stalled(&ticket);
        Self { ticket, eligible_approvers, stalled }
    }
}

pub fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}

pub fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn already_decided(ticket_id: &TicketId) -> ApplicationError {
    ApplicationError::Domain(DomainError::InvariantViolation(format!(
        "ticket {} is already decided",
        ticket_id.0
    )))
}

pub async fn load_ticket(
    state: &AppState,
    ticket_id: &TicketId,
) -> Result<Ticket, ApplicationError> {
    state
        .tickets
        .find_by_id(ticket_id)
        .await
        .map_err(persistence)?
        .ok_or_else(|| ApplicationError::NotFound(format!("ticket {} not found", ticket_id.0)))
}

pub async fn load_roster(
    state: &AppState,
    department_id: &DepartmentId,
) -> Result<ApprovalRoster, ApplicationError> {
    let admins = state.admins.list_for_department(department_id).await.map_err(persistence)?;
    Ok(ApprovalRoster::for_department(department_id, admins))
}

pub async fn view(state: &AppState, ticket: Ticket) -> Result<TicketView, ApplicationError> {
    let roster = load_roster(state, &ticket.department_id).await?;
    Ok(TicketView::new(ticket, &roster))
}

pub async fn submit(
    state: &AppState,
    request: NewTicket,
    correlation_id: &str,
) -> Result<TicketView, ApplicationError> {
    let ticket = Ticket::submit(request, Utc::now())?;
    state.tickets.save(ticket.clone()).await.map_err(persistence)?;

    let roster = load_roster(state, &ticket.department_id).await?;
    let audit = AuditContext::new(Some(ticket.id.clone()), correlation_id, &ticket.created_by);
    dispatch::record_audit(
        state,
        vec![AuditEvent::new(
            &audit,
            "ticket.submitted",
            AuditCategory::Ingress,
            AuditOutcome::Success,
        )
        .with_metadata("department_id", ticket.department_id.0.clone())
        .with_metadata("is_purchase_ticket", ticket.is_purchase_ticket.to_string())],
    )
    .await;

    let effects = state.workflow.on_submitted(&ticket, &roster);
    dispatch::run_side_effects(state, &ticket, &effects, correlation_id).await;

    let view = TicketView::new(ticket, &roster);
    if view.stalled {
        warn!(
            event_name = "ticket.stalled",
            correlation_id = %correlation_id,
            ticket_id = %view.ticket.id.0,
            next_admin_order = view.ticket.next_admin_order,
            "no admin can act on the ticket at its current order"
        );
    }
    info!(
        event_name = "ticket.submitted",
        correlation_id = %correlation_id,
        ticket_id = %view.ticket.id.0,
        department_id = %view.ticket.department_id.0,
        "ticket submitted"
    );
    Ok(view)
}

/// Applies an approve/reject decision and runs its follow-ups.
///
/// `ticket` may be stale. The write only lands while the stored row is still
/// pending, so a rejection is never undone; parallel approvals from one
/// snapshot each advance the order. The ticket row is written before any side
/// effect; audit rows are written for refusals too.
pub async fn act(
    state: &AppState,
    ticket: &Ticket,
    actor: &str,
    action: TicketAction,
    reason: Option<&str>,
    correlation_id: &str,
) -> Result<TransitionOutcome, ApplicationError> {
    let roster = load_roster(state, &ticket.department_id).await?;
    let audit = AuditContext::new(Some(ticket.id.clone()), correlation_id, actor);
    let sink = InMemoryAuditSink::default();

    let result =
        state.workflow.apply_with_audit(ticket, &roster, action, reason, Utc::now(), &sink, &audit);
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(error) => {
            dispatch::record_audit(state, sink.events()).await;
            info!(
                event_name = "ticket.action.refused",
                correlation_id = %correlation_id,
                ticket_id = %ticket.id.0,
                actor = %actor,
                action = action.as_str(),
                reason = %error,
                "ticket action refused"
            );
            return Err(error.into());
        }
    };

    let stored = state
        .tickets
        .save_transition(&outcome.ticket, TicketStatus::Pending, outcome.from_order)
        .await
        .map_err(persistence)?;
    let Some(stored) = stored else {
        let refused = AuditEvent::new(
            &audit,
            format!("ticket.{}_refused", action.as_str()),
            AuditCategory::Approval,
            AuditOutcome::Rejected,
        )
        .with_metadata("error", "ticket is already decided");
        dispatch::record_audit(state, vec![refused]).await;
        info!(
            event_name = "ticket.action.refused",
            correlation_id = %correlation_id,
            ticket_id = %ticket.id.0,
            actor = %actor,
            action = action.as_str(),
            reason = "decided concurrently",
            "ticket action refused"
        );
        return Err(already_decided(&ticket.id));
    };
    let outcome = outcome.rebase(stored, &roster);

    dispatch::record_audit(state, sink.events()).await;
    dispatch::run_side_effects(state, &outcome.ticket, &outcome.side_effects, correlation_id)
        .await;

    info!(
        event_name = "ticket.action.applied",
        correlation_id = %correlation_id,
        ticket_id = %outcome.ticket.id.0,
        actor = %actor,
        action = action.as_str(),
        from_order = outcome.from_order,
        to_order = outcome.to_order,
        status = outcome.to_status.as_str(),
        "ticket action applied"
    );
    if outcome.stalled {
        warn!(
            event_name = "ticket.stalled",
            correlation_id = %correlation_id,
            ticket_id = %outcome.ticket.id.0,
            next_admin_order = outcome.to_order,
            "no admin can act on the ticket at its current order"
        );
    }
    Ok(outcome)
}

pub async fn close(
    state: &AppState,
    ticket_id: &TicketId,
    actor: &str,
    correlation_id: &str,
) -> Result<Ticket, ApplicationError> {
    let ticket = load_ticket(state, ticket_id).await?;
    let closed = state.workflow.close(&ticket, Utc::now())?;
    let closed = state
        .tickets
        .save_transition(&closed, TicketStatus::Approved, ticket.next_admin_order)
        .await
        .map_err(persistence)?
        .ok_or_else(|| already_decided(&ticket.id))?;

    let audit = AuditContext::new(Some(closed.id.clone()), correlation_id, actor);
    dispatch::record_audit(
        state,
        vec![AuditEvent::new(&audit, "ticket.close", AuditCategory::Approval, AuditOutcome::Success)
            .with_metadata("from_status", TicketStatus::Approved.as_str())],
    )
    .await;
    dispatch::run_side_effects(
        state,
        &closed,
        &[SideEffect::LogActivity {
            action: "closed".to_string(),
            actor: actor.to_string(),
            detail: "ticket closed".to_string(),
        }],
        correlation_id,
    )
    .await;

    Ok(closed)
}

/// Pending tickets waiting on `user_id` right now, across their departments.
pub async fn pending_for_approver(
    state: &AppState,
    user_id: &str,
) -> Result<Vec<TicketView>, ApplicationError> {
    let memberships = state.admins.list_for_user(user_id).await.map_err(persistence)?;
    let departments: BTreeSet<DepartmentId> =
        memberships.into_iter().map(|admin| admin.department_id).collect();

    let mut waiting = Vec::new();
    for department_id in departments {
        let roster = load_roster(state, &department_id).await?;
        let pending = state
            .tickets
            .list_pending(&department_id, PENDING_SCAN_LIMIT)
            .await
            .map_err(persistence)?;
        for ticket in pending {
            if roster.check_eligibility(&ticket, user_id).allowed {
                waiting.push(TicketView::new(ticket, &roster));
            }
        }
    }
    Ok(waiting)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use secrecy::SecretString;

    use edara_core::notify::InMemoryNotifier;
    use edara_core::{
        ActionTokenSigner, DepartmentAdmin, DepartmentId, NewTicket, TicketAction, TicketStatus,
        TicketWorkflow,
    };
    use edara_db::repositories::{
        DepartmentAdminRepository, InMemoryAuditEventRepository,
        InMemoryDepartmentAdminRepository, InMemoryTicketActivityRepository,
        InMemoryTicketRepository, TicketRepository,
    };

    use super::{act, close, pending_for_approver, submit};
    use crate::action_links;
    use crate::state::AppState;

    async fn in_memory_state() -> (AppState, Arc<InMemoryAuditEventRepository>) {
        let audit = Arc::new(InMemoryAuditEventRepository::default());
        let admins = Arc::new(InMemoryDepartmentAdminRepository::default());
        let dept = DepartmentId("DEP-OPS".to_string());
        for admin in [
            DepartmentAdmin::regular(&dept, "ops-lead", 0),
            DepartmentAdmin::regular(&dept, "ops-deputy", 0),
            DepartmentAdmin::regular(&dept, "ops-director", 1),
        ] {
            admins.save(admin).await.expect("seed admin");
        }

        let state = AppState {
            tickets: Arc::new(InMemoryTicketRepository::default()),
            admins,
            activity: Arc::new(InMemoryTicketActivityRepository::default()),
            audit: audit.clone(),
            notifier: Arc::new(InMemoryNotifier::default()),
            signer: ActionTokenSigner::new(SecretString::from("service-test-secret-01")),
            public_base_url: "http://edara.test".to_string(),
            workflow: TicketWorkflow,
            templates: action_links::templates(),
        };
        (state, audit)
    }

    fn request() -> NewTicket {
        NewTicket {
            department_id: DepartmentId("DEP-OPS".to_string()),
            title: "Forklift service".to_string(),
            description: String::new(),
            created_by: "storekeeper".to_string(),
            is_purchase_ticket: false,
            purchase_amount: None,
        }
    }

    #[tokio::test]
    async fn stale_approval_after_rejection_is_refused_and_audited() {
        let (state, audit) = in_memory_state().await;
        let snapshot = submit(&state, request(), "req-1").await.expect("submit").ticket;

        act(&state, &snapshot, "ops-lead", TicketAction::Reject, None, "req-2")
            .await
            .expect("reject");
        let refused = act(&state, &snapshot, "ops-deputy", TicketAction::Approve, None, "req-3")
            .await
            .expect_err("already decided");
        assert_eq!(refused.into_interface("req-3").http_status(), 400);

        let stored = state.tickets.find_by_id(&snapshot.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, TicketStatus::Rejected);

        let events: Vec<String> =
            audit.events().await.into_iter().map(|event| event.event_type).collect();
        assert_eq!(events, vec!["ticket.submitted", "ticket.reject", "ticket.approve_refused"]);
    }

    #[tokio::test]
    async fn parallel_approvals_each_advance_the_order() {
        let (state, _) = in_memory_state().await;
        let snapshot = submit(&state, request(), "req-1").await.expect("submit").ticket;

        act(&state, &snapshot, "ops-lead", TicketAction::Approve, None, "req-2")
            .await
            .expect("first");
        let second = act(&state, &snapshot, "ops-deputy", TicketAction::Approve, None, "req-3")
            .await
            .expect("second");

        // Each approval advanced the order; nobody sits at order 2.
        assert_eq!(second.to_order, 2);
        assert_eq!(second.to_status, TicketStatus::Pending);
        assert!(second.stalled);
    }

    #[tokio::test]
    async fn inbox_and_close_follow_the_stored_ticket() {
        let (state, _) = in_memory_state().await;
        let ticket = submit(&state, request(), "req-1").await.expect("submit").ticket;

        let inbox = pending_for_approver(&state, "ops-deputy").await.expect("inbox");
        assert_eq!(inbox.len(), 1);
        assert!(pending_for_approver(&state, "ops-director").await.expect("inbox").is_empty());

        let at_one = act(&state, &ticket, "ops-deputy", TicketAction::Approve, None, "req-2")
            .await
            .expect("order 0");
        let done = act(&state, &at_one.ticket, "ops-director", TicketAction::Approve, None, "req-3")
            .await
            .expect("order 1");
        assert!(done.completed);

        let closed = close(&state, &ticket.id, "ops-director", "req-4").await.expect("close");
        assert_eq!(closed.status, TicketStatus::Closed);
        assert!(close(&state, &ticket.id, "ops-director", "req-5").await.is_err());
    }
}
