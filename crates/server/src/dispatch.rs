//! Best-effort follow-ups of a ticket transition.
//!
//! Activity rows and audit events are written inline; notifications are
//! spawned onto the runtime. None of these can fail the request that caused
//! them, failures only show up in the log.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use edara_core::action_token::ActionTokenError;
use edara_core::audit::{AuditEvent, AuditSink, TracingAuditSink};
use edara_core::notify::{Notification, Notifier};
use edara_core::{NotificationKind, SideEffect, Ticket, TicketAction, TicketActivity};

use crate::state::AppState;

pub async fn record_audit(state: &AppState, events: Vec<AuditEvent>) {
    for event in events {
        TracingAuditSink.emit(event.clone());
        let event_type = event.event_type.clone();
        if let Err(error) = state.audit.append(event).await {
            error!(
                event_name = "ticket.audit.write_failed",
                audit_event_type = %event_type,
                error = %error,
                "failed to persist audit event"
            );
        }
    }
}

pub async fn run_side_effects(
    state: &AppState,
    ticket: &Ticket,
    effects: &[SideEffect],
    correlation_id: &str,
) {
    for effect in effects {
        match effect {
            SideEffect::LogActivity { action, actor, detail } => {
                let activity = TicketActivity::new(&ticket.id, action, actor, detail, Utc::now());
                if let Err(error) = state.activity.append(activity).await {
                    error!(
                        event_name = "ticket.activity.write_failed",
                        correlation_id = %correlation_id,
                        ticket_id = %ticket.id.0,
                        error = %error,
                        "failed to append ticket activity"
                    );
                }
            }
            SideEffect::NotifyRequester { user_id, notification } => {
                let message = requester_notification(ticket, user_id, *notification);
                spawn_delivery(state.notifier.clone(), message, correlation_id);
            }
            SideEffect::NotifyNextApprovers { user_ids, admin_order } => {
                for user_id in user_ids {
                    match approval_request(state, ticket, user_id, *admin_order) {
                        Ok(message) => {
                            spawn_delivery(state.notifier.clone(), message, correlation_id)
                        }
                        Err(error) => warn!(
                            event_name = "notify.approval_request.link_failed",
                            correlation_id = %correlation_id,
                            ticket_id = %ticket.id.0,
                            user_id = %user_id,
                            error = %error,
                            "could not build action links for approver"
                        ),
                    }
                }
            }
        }
    }
}

fn requester_notification(ticket: &Ticket, user_id: &str, kind: NotificationKind) -> Notification {
    let (subject, body) = match kind {
        NotificationKind::TicketApproved => (
            format!("Ticket {} approved", ticket.id.0),
            format!("Your ticket \"{}\" has been fully approved.", ticket.title),
        ),
        NotificationKind::TicketRejected => (
            format!("Ticket {} rejected", ticket.id.0),
            match &ticket.rejection_reason {
                Some(reason) => format!("Your ticket \"{}\" was rejected: {reason}", ticket.title),
                None => format!("Your ticket \"{}\" was rejected.", ticket.title),
            },
        ),
        NotificationKind::ApprovalRequested => (
            format!("Ticket {} submitted", ticket.id.0),
            format!("Your ticket \"{}\" is waiting for approval.", ticket.title),
        ),
    };

    Notification {
        kind,
        ticket_id: ticket.id.clone(),
        recipients: vec![user_id.to_string()],
        subject,
        body,
    }
}

/// One message per approver: each carries links signed for that user.
fn approval_request(
    state: &AppState,
    ticket: &Ticket,
    user_id: &str,
    admin_order: u32,
) -> Result<Notification, ActionTokenError> {
    let approve_link = state.signer.action_link(
        &state.public_base_url,
        &ticket.id,
        TicketAction::Approve,
        user_id,
        admin_order,
    )?;
    let reject_link = state.signer.action_link(
        &state.public_base_url,
        &ticket.id,
        TicketAction::Reject,
        user_id,
        admin_order,
    )?;

    Ok(Notification {
        kind: NotificationKind::ApprovalRequested,
        ticket_id: ticket.id.clone(),
        recipients: vec![user_id.to_string()],
        subject: format!("Approval needed: {}", ticket.title),
        body: format!(
            "Ticket {} from {} needs your approval.\n\nApprove: {approve_link}\nReject: {reject_link}",
            ticket.id.0, ticket.created_by
        ),
    })
}

fn spawn_delivery(notifier: Arc<dyn Notifier>, notification: Notification, correlation_id: &str) {
    let correlation_id = correlation_id.to_string();
    tokio::spawn(async move {
        match notifier.send(&notification).await {
            Ok(()) => info!(
                event_name = "notify.sent",
                correlation_id = %correlation_id,
                ticket_id = %notification.ticket_id.0,
                kind = ?notification.kind,
                "notification delivered"
            ),
            Err(error) => warn!(
                event_name = "notify.failed",
                correlation_id = %correlation_id,
                ticket_id = %notification.ticket_id.0,
                kind = ?notification.kind,
                error = %error,
                "notification delivery failed"
            ),
        }
    });
}
