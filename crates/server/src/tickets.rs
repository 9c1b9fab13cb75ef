//! JSON API for tickets and approver inboxes.
//!
//! - `POST /api/v1/tickets`                        : submit a ticket
//! - `GET  /api/v1/tickets/{ticket_id}`            : ticket with its current approvers
//! - `POST /api/v1/tickets/{ticket_id}/approve`    : approve at the current order
//! - `POST /api/v1/tickets/{ticket_id}/reject`     : reject, with optional reason
//! - `POST /api/v1/tickets/{ticket_id}/close`      : archive an approved ticket
//! - `GET  /api/v1/tickets/{ticket_id}/activity`   : activity trail
//! - `GET  /api/v1/approvers/{user_id}/pending`    : tickets waiting on an admin

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

use edara_core::{
    ApplicationError, DepartmentId, NewTicket, Ticket, TicketAction, TicketActivity, TicketId,
    TicketStatus, TransitionOutcome,
};

use crate::service::{self, TicketView};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
pub struct SubmitTicketRequest {
    pub department_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_by: String,
    #[serde(default)]
    pub is_purchase_ticket: bool,
    pub purchase_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub user_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub ticket: Ticket,
    pub action: TicketAction,
    pub from_status: TicketStatus,
    pub to_status: TicketStatus,
    pub from_order: u32,
    pub to_order: u32,
    pub completed: bool,
    pub stalled: bool,
}

impl From<TransitionOutcome> for TransitionResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            ticket: outcome.ticket,
            action: outcome.action,
            from_status: outcome.from_status,
            to_status: outcome.to_status,
            from_order: outcome.from_order,
            to_order: outcome.to_order,
            completed: outcome.completed,
            stalled: outcome.stalled,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tickets", post(submit_ticket))
        .route("/api/v1/tickets/{ticket_id}", get(get_ticket))
        .route("/api/v1/tickets/{ticket_id}/approve", post(approve_ticket))
        .route("/api/v1/tickets/{ticket_id}/reject", post(reject_ticket))
        .route("/api/v1/tickets/{ticket_id}/close", post(close_ticket))
        .route("/api/v1/tickets/{ticket_id}/activity", get(ticket_activity))
        .route("/api/v1/approvers/{user_id}/pending", get(pending_for_approver))
        .with_state(state)
}

pub(crate) fn api_error(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let mapped = error.into_interface(correlation_id);
    let status =
        StatusCode::from_u16(mapped.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = if status.is_server_error() {
        error!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            error = %mapped.message(),
            "ticket api request failed"
        );
        mapped.user_message().to_string()
    } else {
        mapped.message().to_string()
    };
    (status, Json(ApiError { error: message, correlation_id: correlation_id.to_string() }))
}

fn required_user_id<'a>(user_id: &'a str, correlation_id: &str) -> Result<&'a str, ApiFailure> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "user_id is required".to_string(),
                correlation_id: correlation_id.to_string(),
            }),
        ));
    }
    Ok(user_id)
}

pub async fn submit_ticket(
    State(state): State<AppState>,
    Json(body): Json<SubmitTicketRequest>,
) -> Result<(StatusCode, Json<TicketView>), ApiFailure> {
    let correlation_id = service::correlation_id();
    let request = NewTicket {
        department_id: DepartmentId(body.department_id.trim().to_string()),
        title: body.title,
        description: body.description,
        created_by: body.created_by.trim().to_string(),
        is_purchase_ticket: body.is_purchase_ticket,
        purchase_amount: body.purchase_amount,
    };

    let view = service::submit(&state, request, &correlation_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_ticket(
    Path(ticket_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TicketView>, ApiFailure> {
    let correlation_id = service::correlation_id();
    let ticket = service::load_ticket(&state, &TicketId(ticket_id))
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    let view =
        service::view(&state, ticket).await.map_err(|error| api_error(error, &correlation_id))?;
    Ok(Json(view))
}

pub async fn approve_ticket(
    Path(ticket_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<TransitionResponse>, ApiFailure> {
    act(&state, ticket_id, body.user_id, TicketAction::Approve, None).await
}

pub async fn reject_ticket(
    Path(ticket_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<TransitionResponse>, ApiFailure> {
    act(&state, ticket_id, body.user_id, TicketAction::Reject, body.reason).await
}

async fn act(
    state: &AppState,
    ticket_id: String,
    user_id: String,
    action: TicketAction,
    reason: Option<String>,
) -> Result<Json<TransitionResponse>, ApiFailure> {
    let correlation_id = service::correlation_id();
    let user_id = required_user_id(&user_id, &correlation_id)?;

    let outcome = async {
        let ticket = service::load_ticket(state, &TicketId(ticket_id)).await?;
        service::act(state, &ticket, user_id, action, reason.as_deref(), &correlation_id).await
    }
    .await
    .map_err(|error| api_error(error, &correlation_id))?;

    Ok(Json(outcome.into()))
}

pub async fn close_ticket(
    Path(ticket_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<CloseRequest>,
) -> Result<Json<Ticket>, ApiFailure> {
    let correlation_id = service::correlation_id();
    let user_id = required_user_id(&body.user_id, &correlation_id)?;
    let closed = service::close(&state, &TicketId(ticket_id), user_id, &correlation_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(Json(closed))
}

pub async fn ticket_activity(
    Path(ticket_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TicketActivity>>, ApiFailure> {
    let correlation_id = service::correlation_id();
    let ticket_id = TicketId(ticket_id);
    let activity = async {
        service::load_ticket(&state, &ticket_id).await?;
        state.activity.list_for_ticket(&ticket_id).await.map_err(service::persistence)
    }
    .await
    .map_err(|error| api_error(error, &correlation_id))?;
    Ok(Json(activity))
}

pub async fn pending_for_approver(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TicketView>>, ApiFailure> {
    let correlation_id = service::correlation_id();
    let waiting = service::pending_for_approver(&state, &user_id)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(Json(waiting))
}
