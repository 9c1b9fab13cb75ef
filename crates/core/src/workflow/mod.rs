use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::{ApprovalRoster, EligibilityFailure};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::ticket::{Ticket, TicketStatus};
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    Approve,
    Reject,
}

impl TicketAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl std::str::FromStr for TicketAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported ticket action `{other}` (expected approve|reject)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApprovalRequested,
    TicketApproved,
    TicketRejected,
}

/// Best-effort follow-ups of a transition. Callers run them after the ticket
/// is stored; a failing side effect never undoes the transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    LogActivity { action: String, actor: String, detail: String },
    NotifyRequester { user_id: String, notification: NotificationKind },
    NotifyNextApprovers { user_ids: Vec<String>, admin_order: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub ticket: Ticket,
    pub action: TicketAction,
    pub actor: String,
    pub from_status: TicketStatus,
    pub to_status: TicketStatus,
    pub from_order: u32,
    pub to_order: u32,
    pub completed: bool,
    pub stalled: bool,
    pub side_effects: Vec<SideEffect>,
}

impl TransitionOutcome {
    /// Points the outcome at the row that was actually stored.
    ///
    /// Another approval taken from the same snapshot may have moved the order
    /// further than this decision saw; next-approver notices then follow the
    /// stored order.
    pub fn rebase(mut self, stored: Ticket, roster: &ApprovalRoster) -> Self {
        if stored.is_pending() && stored.next_admin_order != self.to_order {
            self.side_effects
                .retain(|effect| !matches!(effect, SideEffect::NotifyNextApprovers { .. }));
            self.side_effects.extend(next_approver_effect(&stored, roster));
        }
        self.to_status = stored.status;
        self.to_order = stored.next_admin_order;
        self.stalled = roster.is_stalled(&stored);
        self.ticket = stored;
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("ticket is {} and can no longer be acted on", .status.as_str())]
    TicketNotPending { status: TicketStatus },
    #[error("{}", .0.reason())]
    NotEligible(EligibilityFailure),
    #[error(transparent)]
    InvalidTransition(#[from] DomainError),
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::TicketNotPending { status } => {
                ApplicationError::Domain(DomainError::InvariantViolation(format!(
                    "ticket is already {}",
                    status.as_str()
                )))
            }
            WorkflowError::NotEligible(failure) => ApplicationError::Forbidden(failure.reason()),
            WorkflowError::InvalidTransition(error) => ApplicationError::Domain(error),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TicketWorkflow;

impl TicketWorkflow {
    /// Notifications owed right after a ticket is raised.
    pub fn on_submitted(&self, ticket: &Ticket, roster: &ApprovalRoster) -> Vec<SideEffect> {
        let mut effects = vec![SideEffect::LogActivity {
            action: "submitted".to_string(),
            actor: ticket.created_by.clone(),
            detail: format!("ticket `{}` submitted", ticket.title),
        }];
        effects.extend(next_approver_effect(ticket, roster));
        effects
    }

    pub fn apply(
        &self,
        ticket: &Ticket,
        roster: &ApprovalRoster,
        actor: &str,
        action: TicketAction,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if !ticket.is_pending() {
            return Err(WorkflowError::TicketNotPending { status: ticket.status });
        }

        let eligibility = roster.check_eligibility(ticket, actor);
        if let Some(failure) = eligibility.failure {
            return Err(WorkflowError::NotEligible(failure));
        }

        match action {
            TicketAction::Approve => Ok(approve(ticket, roster, actor, now)),
            TicketAction::Reject => Ok(reject(ticket, actor, reason, now)),
        }
    }

    pub fn apply_with_audit<S>(
        &self,
        ticket: &Ticket,
        roster: &ApprovalRoster,
        action: TicketAction,
        reason: Option<&str>,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, WorkflowError>
    where
        S: AuditSink,
    {
        let result = self.apply(ticket, roster, &audit.actor, action, reason, now);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        format!("ticket.{}", action.as_str()),
                        AuditCategory::Approval,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from_status", outcome.from_status.as_str())
                    .with_metadata("to_status", outcome.to_status.as_str())
                    .with_metadata("from_order", outcome.from_order.to_string())
                    .with_metadata("to_order", outcome.to_order.to_string())
                    .with_metadata("stalled", outcome.stalled.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        format!("ticket.{}_refused", action.as_str()),
                        AuditCategory::Approval,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    /// Archives an approved ticket.
    pub fn close(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<Ticket, WorkflowError> {
        if ticket.status != TicketStatus::Approved {
            return Err(WorkflowError::InvalidTransition(DomainError::InvalidTicketTransition {
                from: ticket.status,
                to: TicketStatus::Closed,
            }));
        }
        let mut closed = ticket.clone();
        closed.status = TicketStatus::Closed;
        closed.updated_at = now;
        Ok(closed)
    }
}

fn approve(
    ticket: &Ticket,
    roster: &ApprovalRoster,
    actor: &str,
    now: DateTime<Utc>,
) -> TransitionOutcome {
    let from_order = ticket.next_admin_order;
    let mut updated = ticket.clone();
    updated.next_admin_order = from_order.saturating_add(1);
    updated.updated_at = now;

    let completed = !roster.has_tier_after(ticket, from_order);
    let mut side_effects = vec![SideEffect::LogActivity {
        action: "approved".to_string(),
        actor: actor.to_string(),
        detail: format!("approved at order {from_order}"),
    }];

    if completed {
        updated.status = TicketStatus::Approved;
        updated.approved_at = Some(now);
        side_effects.push(SideEffect::NotifyRequester {
            user_id: updated.created_by.clone(),
            notification: NotificationKind::TicketApproved,
        });
    } else {
        side_effects.extend(next_approver_effect(&updated, roster));
    }

    let stalled = roster.is_stalled(&updated);
    TransitionOutcome {
        action: TicketAction::Approve,
        actor: actor.to_string(),
        from_status: ticket.status,
        to_status: updated.status,
        from_order,
        to_order: updated.next_admin_order,
        completed,
        stalled,
        side_effects,
        ticket: updated,
    }
}

fn reject(
    ticket: &Ticket,
    actor: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> TransitionOutcome {
    let reason = reason.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string);
    let mut updated = ticket.clone();
    updated.status = TicketStatus::Rejected;
    updated.rejected_at = Some(now);
    updated.rejection_reason = reason.clone();
    updated.updated_at = now;

    let detail = match &reason {
        Some(reason) => format!("rejected at order {}: {reason}", ticket.next_admin_order),
        None => format!("rejected at order {}", ticket.next_admin_order),
    };

    TransitionOutcome {
        action: TicketAction::Reject,
        actor: actor.to_string(),
        from_status: ticket.status,
        to_status: TicketStatus::Rejected,
        from_order: ticket.next_admin_order,
        to_order: ticket.next_admin_order,
        completed: true,
        stalled: false,
        side_effects: vec![
            SideEffect::LogActivity {
                action: "rejected".to_string(),
                actor: actor.to_string(),
                detail,
            },
            SideEffect::NotifyRequester {
                user_id: updated.created_by.clone(),
                notification: NotificationKind::TicketRejected,
            },
        ],
        ticket: updated,
    }
}

fn next_approver_effect(ticket: &Ticket, roster: &ApprovalRoster) -> Option<SideEffect> {
    let user_ids: Vec<String> =
        roster.eligible_approvers(ticket).iter().map(|admin| admin.user_id.clone()).collect();
    (!user_ids.is_empty()).then(|| SideEffect::NotifyNextApprovers {
        user_ids,
        admin_order: ticket.next_admin_order,
    })
}
