//! Email action links.
//!
//! `GET /handle-ticket-action?ticketId=..&action=approve|reject&token=..`
//!
//! The admin lands here from the approval email, so every outcome is an HTML
//! page. Status codes: 400 bad parameters or ticket no longer pending, 401 bad
//! token, 403 not eligible or stale link, 404 unknown ticket, 500 storage.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use tera::{Context, Tera};
use tracing::{info, warn};

use edara_core::action_token::ACTION_PATH;
use edara_core::{ApplicationError, DomainError, TicketAction, TicketId, TicketStatus};

use crate::service;
use crate::state::AppState;

const PAGE_TEMPLATE: &str = "ticket_action.html";

const PAGE_SOURCE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{{ heading }}</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 4rem auto; max-width: 36rem; color: #1f2933; }
    .card { border: 1px solid #d9e2ec; border-radius: 8px; padding: 2rem; }
    .ok h1 { color: #18794e; }
    .error h1 { color: #b42318; }
    .meta { color: #627d98; font-size: 0.9rem; }
  </style>
</head>
<body>
  <div class="card {% if success %}ok{% else %}error{% endif %}">
    <h1>{{ heading }}</h1>
    <p>{{ message }}</p>
    {% if ticket_id %}<p class="meta">Ticket {{ ticket_id }}{% if status %} &middot; {{ status }}{% endif %}</p>{% endif %}
    {% if correlation_id %}<p class="meta">Reference {{ correlation_id }}</p>{% endif %}
  </div>
</body>
</html>
"#;

pub fn templates() -> Arc<Tera> {
    let mut tera = Tera::default();
    if let Err(error) = tera.add_raw_template(PAGE_TEMPLATE, PAGE_SOURCE) {
        warn!(error = %error, "failed to register action link template, falling back to plain html");
    }
    Arc::new(tera)
}

pub fn router(state: AppState) -> Router {
    Router::new().route(ACTION_PATH, get(handle_ticket_action)).with_state(state)
}

/// Raw query; every field is optional so missing ones get our own 400 page.
#[derive(Debug, Default, Deserialize)]
pub struct ActionLinkQuery {
    #[serde(rename = "ticketId")]
    pub ticket_id: Option<String>,
    pub action: Option<String>,
    pub token: Option<String>,
}

struct Page {
    success: bool,
    heading: String,
    message: String,
    ticket_id: Option<String>,
    status: Option<TicketStatus>,
    correlation_id: String,
}

pub async fn handle_ticket_action(
    State(state): State<AppState>,
    Query(query): Query<ActionLinkQuery>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let correlation_id = service::correlation_id();
    let ticket_hint = query.ticket_id.clone();

    match apply_link(&state, query, &correlation_id).await {
        Ok(page) => Ok(Html(render(&state.templates, &page))),
        Err(error) => {
            let mapped = error.into_interface(&correlation_id);
            let status = StatusCode::from_u16(mapped.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            warn!(
                event_name = "ticket.action_link.failed",
                correlation_id = %correlation_id,
                ticket_id = ticket_hint.as_deref().unwrap_or("unknown"),
                status = status.as_u16(),
                error = %mapped.message(),
                "action link could not be applied"
            );

            let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                mapped.user_message().to_string()
            } else {
                mapped.message().to_string()
            };
            let page = Page {
                success: false,
                heading: mapped.user_message().to_string(),
                message,
                ticket_id: ticket_hint,
                status: None,
                correlation_id,
            };
            Err((status, Html(render(&state.templates, &page))))
        }
    }
}

async fn apply_link(
    state: &AppState,
    query: ActionLinkQuery,
    correlation_id: &str,
) -> Result<Page, ApplicationError> {
    let ticket_id = required(query.ticket_id, "ticketId")?;
    let action: TicketAction = required(query.action, "action")?.parse()?;
    let token = required(query.token, "token")?;
    let ticket_id = TicketId(ticket_id);

    let claims = state
        .signer
        .verify(&ticket_id, action, &token)
        .map_err(|error| ApplicationError::Unauthenticated(error.to_string()))?;

    let ticket = service::load_ticket(state, &ticket_id).await?;
    if !ticket.is_pending() {
        return Err(ApplicationError::Domain(DomainError::InvariantViolation(format!(
            "ticket {} is already {}",
            ticket.id.0,
            ticket.status.as_str()
        ))));
    }
    if claims.admin_order != ticket.next_admin_order {
        return Err(ApplicationError::Forbidden(format!(
            "this link was issued for approval step {} but the ticket is at step {}",
            claims.admin_order, ticket.next_admin_order
        )));
    }

    let outcome =
        service::act(state, &ticket, &claims.user_id, action, None, correlation_id).await?;

    info!(
        event_name = "ticket.action_link.applied",
        correlation_id = %correlation_id,
        ticket_id = %outcome.ticket.id.0,
        user_id = %claims.user_id,
        action = action.as_str(),
        "action link applied"
    );

    let (heading, message) = match (action, outcome.to_status) {
        (TicketAction::Reject, _) => {
            ("Ticket rejected", "The requester has been notified of the rejection.")
        }
        (TicketAction::Approve, TicketStatus::Approved) => {
            ("Ticket approved", "This was the final approval. The requester has been notified.")
        }
        (TicketAction::Approve, _) => {
            ("Approval recorded", "The ticket has moved on to the next approver.")
        }
    };

    Ok(Page {
        success: true,
        heading: heading.to_string(),
        message: message.to_string(),
        ticket_id: Some(outcome.ticket.id.0.clone()),
        status: Some(outcome.to_status),
        correlation_id: correlation_id.to_string(),
    })
}

fn required(value: Option<String>, name: &str) -> Result<String, ApplicationError> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty()).ok_or_else(|| {
        ApplicationError::Domain(DomainError::InvariantViolation(format!(
            "missing query parameter `{name}`"
        )))
    })
}

fn render(templates: &Tera, page: &Page) -> String {
    let mut context = Context::new();
    context.insert("success", &page.success);
    context.insert("heading", &page.heading);
    context.insert("message", &page.message);
    context.insert("ticket_id", &page.ticket_id);
    context.insert("status", &page.status.map(|status| status.as_str()));
    context.insert("correlation_id", &page.correlation_id);

    match templates.render(PAGE_TEMPLATE, &context) {
        Ok(html) => html,
        Err(error) => {
            warn!(error = %error, "action link template render failed");
            format!("<h1>{}</h1><p>{}</p>", page.heading, page.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use edara_core::notify::InMemoryNotifier;
    use edara_core::{
        ActionTokenSigner, DepartmentAdmin, DepartmentId, NewTicket, TicketAction, TicketStatus,
    };
    use edara_db::{connect_with_settings, migrations};

    use super::{handle_ticket_action, ActionLinkQuery};
    use crate::service;
    use crate::state::AppState;

    async fn setup() -> (AppState, InMemoryNotifier) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let notifier = InMemoryNotifier::default();
        let state = AppState::from_pool(
            pool,
            ActionTokenSigner::new(SecretString::from("test-signing-secret-0001")),
            "http://edara.test",
            Arc::new(notifier.clone()),
        );

        let dept = DepartmentId("DEP-1".to_string());
        for admin in [
            DepartmentAdmin::regular(&dept, "reg-0", 0),
            DepartmentAdmin::regular(&dept, "reg-1", 1),
            DepartmentAdmin::purchase(&dept, "buyer-1", 1),
        ] {
            state.admins.save(admin).await.expect("seed admin");
        }
        (state, notifier)
    }

    async fn submit(state: &AppState, is_purchase: bool) -> edara_core::Ticket {
        service::submit(
            state,
            NewTicket {
                department_id: DepartmentId("DEP-1".to_string()),
                title: "Office chairs".to_string(),
                description: "Six chairs".to_string(),
                created_by: "user-9".to_string(),
                is_purchase_ticket: is_purchase,
                purchase_amount: is_purchase.then(|| Decimal::new(120_000, 2)),
            },
            "req-test",
        )
        .await
        .expect("submit")
        .ticket
    }

    fn query(ticket_id: &str, action: &str, token: &str) -> Query<ActionLinkQuery> {
        Query(ActionLinkQuery {
            ticket_id: Some(ticket_id.to_string()),
            action: Some(action.to_string()),
            token: Some(token.to_string()),
        })
    }

    #[tokio::test]
    async fn valid_link_advances_ticket_and_renders_page() {
        let (state, _) = setup().await;
        let ticket = submit(&state, false).await;
        let token =
            state.signer.issue(&ticket.id, TicketAction::Approve, "reg-0", 0).expect("token");

        let page = handle_ticket_action(State(state.clone()), query(&ticket.id.0, "approve", &token))
            .await
            .expect("should succeed");
        assert!(page.0.contains("Approval recorded"));

        let stored = service::load_ticket(&state, &ticket.id).await.expect("load");
        assert_eq!(stored.next_admin_order, 1);
        assert_eq!(stored.status, TicketStatus::Pending);
    }

    #[tokio::test]
    async fn missing_parameters_return_bad_request() {
        let (state, _) = setup().await;

        let result =
            handle_ticket_action(State(state), Query(ActionLinkQuery::default())).await;

        let (status, page) = result.expect_err("should fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(page.0.contains("ticketId"));
    }

    #[tokio::test]
    async fn unknown_action_returns_bad_request() {
        let (state, _) = setup().await;
        let ticket = submit(&state, false).await;

        let (status, _) =
            handle_ticket_action(State(state), query(&ticket.id.0, "escalate", "reg-0.0.00"))
                .await
                .expect_err("should fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forged_token_returns_unauthorized() {
        let (state, _) = setup().await;
        let ticket = submit(&state, false).await;
        let other = ActionTokenSigner::new(SecretString::from("some-other-secret-value"));
        let token = other.issue(&ticket.id, TicketAction::Approve, "reg-0", 0).expect("token");

        let (status, _) = handle_ticket_action(State(state), query(&ticket.id.0, "approve", &token))
            .await
            .expect_err("should fail");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_for_other_action_returns_unauthorized() {
        let (state, _) = setup().await;
        let ticket = submit(&state, false).await;
        let token =
            state.signer.issue(&ticket.id, TicketAction::Reject, "reg-0", 0).expect("token");

        let (status, _) = handle_ticket_action(State(state), query(&ticket.id.0, "approve", &token))
            .await
            .expect_err("should fail");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_ticket_returns_not_found() {
        let (state, _) = setup().await;
        let ticket_id = edara_core::TicketId("TKT-GHOST".to_string());
        let token =
            state.signer.issue(&ticket_id, TicketAction::Approve, "reg-0", 0).expect("token");

        let (status, _) = handle_ticket_action(State(state), query("TKT-GHOST", "approve", &token))
            .await
            .expect_err("should fail");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_order_admin_returns_forbidden() {
        let (state, _) = setup().await;
        let ticket = submit(&state, false).await;
        // reg-1 sits at order 1 but signs a link for order 0.
        let token =
            state.signer.issue(&ticket.id, TicketAction::Approve, "reg-1", 0).expect("token");

        let (status, _) = handle_ticket_action(State(state), query(&ticket.id.0, "approve", &token))
            .await
            .expect_err("should fail");
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn stale_link_returns_forbidden() {
        let (state, _) = setup().await;
        let ticket = submit(&state, true).await;
        let stale =
            state.signer.issue(&ticket.id, TicketAction::Approve, "reg-0", 0).expect("token");
        handle_ticket_action(State(state.clone()), query(&ticket.id.0, "approve", &stale))
            .await
            .expect("first click succeeds");

        let (status, _) =
            handle_ticket_action(State(state), query(&ticket.id.0, "approve", &stale))
                .await
                .expect_err("second click is stale");
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn acting_on_rejected_ticket_returns_bad_request() {
        let (state, _) = setup().await;
        let ticket = submit(&state, false).await;
        let reject =
            state.signer.issue(&ticket.id, TicketAction::Reject, "reg-0", 0).expect("token");
        let page = handle_ticket_action(State(state.clone()), query(&ticket.id.0, "reject", &reject))
            .await
            .expect("reject succeeds");
        assert!(page.0.contains("Ticket rejected"));

        let approve =
            state.signer.issue(&ticket.id, TicketAction::Approve, "reg-0", 0).expect("token");
        let (status, page) =
            handle_ticket_action(State(state), query(&ticket.id.0, "approve", &approve))
                .await
                .expect_err("ticket is terminal");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(page.0.contains("rejected"));
    }
}
