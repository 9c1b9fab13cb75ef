use std::sync::Arc;

use tera::Tera;

use edara_core::notify::Notifier;
use edara_core::{ActionTokenSigner, TicketWorkflow};
use edara_db::repositories::{
    AuditEventRepository, DepartmentAdminRepository, SqlAuditEventRepository,
    SqlDepartmentAdminRepository, SqlTicketActivityRepository, SqlTicketRepository,
    TicketActivityRepository, TicketRepository,
};
use edara_db::DbPool;

use crate::action_links;

/// Everything a ticket handler needs, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub tickets: Arc<dyn TicketRepository>,
    pub admins: Arc<dyn DepartmentAdminRepository>,
    pub activity: Arc<dyn TicketActivityRepository>,
    pub audit: Arc<dyn AuditEventRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub signer: ActionTokenSigner,
    pub public_base_url: String,
    pub workflow: TicketWorkflow,
    pub templates: Arc<Tera>,
}

impl AppState {
    pub fn from_pool(
        db_pool: DbPool,
        signer: ActionTokenSigner,
        public_base_url: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            tickets: Arc::new(SqlTicketRepository::new(db_pool.clone())),
            admins: Arc::new(SqlDepartmentAdminRepository::new(db_pool.clone())),
            activity: Arc::new(SqlTicketActivityRepository::new(db_pool.clone())),
            audit: Arc::new(SqlAuditEventRepository::new(db_pool)),
            notifier,
            signer,
            public_base_url: public_base_url.into(),
            workflow: TicketWorkflow,
            templates: action_links::templates(),
        }
    }
}
