//! Approval roster maintenance.
//!
//! - `GET    /api/v1/departments/{department_id}/admins`
//! - `POST   /api/v1/departments/{department_id}/admins`
//! - `DELETE /api/v1/departments/{department_id}/admins/{user_id}`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use edara_core::{ApplicationError, DepartmentAdmin, DepartmentId, DomainError};

use crate::service;
use crate::state::AppState;
use crate::tickets::{api_error, ApiFailure};

#[derive(Debug, Deserialize)]
pub struct SaveAdminRequest {
    pub user_id: String,
    pub admin_order: u32,
    #[serde(default)]
    pub is_purchase_admin: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/departments/{department_id}/admins", get(list_admins).post(save_admin))
        .route("/api/v1/departments/{department_id}/admins/{user_id}", delete(remove_admin))
        .with_state(state)
}

pub async fn list_admins(
    Path(department_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<DepartmentAdmin>>, ApiFailure> {
    let correlation_id = service::correlation_id();
    let roster = service::load_roster(&state, &DepartmentId(department_id))
        .await
        .map_err(|error| api_error(error, &correlation_id))?;
    Ok(Json(roster.admins().to_vec()))
}

pub async fn save_admin(
    Path(department_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SaveAdminRequest>,
) -> Result<(StatusCode, Json<DepartmentAdmin>), ApiFailure> {
    let correlation_id = service::correlation_id();
    let department_id = department_id.trim();
    let user_id = body.user_id.trim();
    if department_id.is_empty() || user_id.is_empty() {
        return Err(api_error(
            ApplicationError::Domain(DomainError::InvariantViolation(
                "department_id and user_id are required".to_string(),
            )),
            &correlation_id,
        ));
    }

    let admin = DepartmentAdmin {
        department_id: DepartmentId(department_id.to_string()),
        user_id: user_id.to_string(),
        admin_order: body.admin_order,
        is_purchase_admin: body.is_purchase_admin,
    };
    state
        .admins
        .save(admin.clone())
        .await
        .map_err(|error| api_error(service::persistence(error), &correlation_id))?;

    info!(
        event_name = "department.admin.saved",
        correlation_id = %correlation_id,
        department_id = %admin.department_id.0,
        user_id = %admin.user_id,
        admin_order = admin.admin_order,
        tier = admin.tier().as_str(),
        "department admin saved"
    );
    Ok((StatusCode::CREATED, Json(admin)))
}

pub async fn remove_admin(
    Path((department_id, user_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiFailure> {
    let correlation_id = service::correlation_id();
    let removed = state
        .admins
        .remove(&DepartmentId(department_id.clone()), &user_id)
        .await
        .map_err(|error| api_error(service::persistence(error), &correlation_id))?;

    if !removed {
        return Err(api_error(
            ApplicationError::NotFound(format!(
                "user {user_id} is not an admin of department {department_id}"
            )),
            &correlation_id,
        ));
    }

    info!(
        event_name = "department.admin.removed",
        correlation_id = %correlation_id,
        department_id = %department_id,
        user_id = %user_id,
        "department admin removed"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use secrecy::SecretString;

    use edara_core::notify::LoggingNotifier;
    use edara_core::ActionTokenSigner;
    use edara_db::{connect_with_settings, migrations};

    use super::*;

    async fn state() -> AppState {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        AppState::from_pool(
            pool,
            ActionTokenSigner::new(SecretString::from("test-signing-secret-0001")),
            "http://edara.test",
            Arc::new(LoggingNotifier),
        )
    }

    async fn add(state: &AppState, user_id: &str, order: u32, purchase: bool) -> StatusCode {
        let (status, _) = save_admin(
            Path("DEP-7".to_string()),
            State(state.clone()),
            Json(SaveAdminRequest {
                user_id: user_id.to_string(),
                admin_order: order,
                is_purchase_admin: purchase,
            }),
        )
        .await
        .expect("save admin");
        status
    }

    #[tokio::test]
    async fn save_then_list_roster_in_order() {
        let state = state().await;
        assert_eq!(add(&state, "buyer", 0, true).await, StatusCode::CREATED);
        add(&state, "lead", 1, false).await;
        add(&state, "manager", 0, false).await;

        let Json(roster) =
            list_admins(Path("DEP-7".to_string()), State(state)).await.expect("list");
        let users: Vec<&str> = roster.iter().map(|admin| admin.user_id.as_str()).collect();
        assert_eq!(users, vec!["manager", "buyer", "lead"]);
    }

    #[tokio::test]
    async fn save_requires_user_id() {
        let state = state().await;
        let (status, _) = save_admin(
            Path("DEP-7".to_string()),
            State(state),
            Json(SaveAdminRequest {
                user_id: " ".to_string(),
                admin_order: 0,
                is_purchase_admin: false,
            }),
        )
        .await
        .expect_err("blank user");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remove_unknown_admin_returns_not_found() {
        let state = state().await;
        add(&state, "manager", 0, false).await;

        let status = remove_admin(
            Path(("DEP-7".to_string(), "manager".to_string())),
            State(state.clone()),
        )
        .await
        .expect("remove");
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) =
            remove_admin(Path(("DEP-7".to_string(), "manager".to_string())), State(state))
                .await
                .expect_err("already removed");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
