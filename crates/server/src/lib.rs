pub mod action_links;
pub mod bootstrap;
pub mod departments;
pub mod dispatch;
pub mod health;
pub mod service;
pub mod state;
pub mod tickets;

use axum::Router;
use edara_db::DbPool;

pub use state::AppState;

/// Full HTTP surface: health probe, JSON API and email action links.
pub fn router(state: AppState, db_pool: DbPool) -> Router {
    Router::new()
        .merge(health::router(db_pool))
        .merge(tickets::router(state.clone()))
        .merge(departments::router(state.clone()))
        .merge(action_links::router(state))
}
