use async_trait::async_trait;
use thiserror::Error;

use edara_core::audit::AuditEvent;
use edara_core::domain::department::{DepartmentAdmin, DepartmentId};
use edara_core::domain::shift::ShiftAttendance;
use edara_core::domain::ticket::{Ticket, TicketActivity, TicketId, TicketStatus};

pub mod activity;
pub mod audit;
pub mod department_admin;
pub mod memory;
pub mod shift_attendance;
pub mod ticket;

pub use activity::SqlTicketActivityRepository;
pub use audit::SqlAuditEventRepository;
pub use department_admin::SqlDepartmentAdminRepository;
pub use memory::{
    InMemoryAuditEventRepository, InMemoryDepartmentAdminRepository,
    InMemoryTicketActivityRepository, InMemoryTicketRepository,
};
pub use shift_attendance::SqlShiftAttendanceRepository;
pub use ticket::SqlTicketRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError>;

    /// Upserts the whole row; the last writer wins.
    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError>;

    /// Stores a decision taken on a copy read while the ticket was
    /// `from_status` at `from_order`.
    ///
    /// Only lands while the stored row still has `from_status`, so a decided
    /// ticket is never overwritten. The order advances relative to the stored
    /// row. Returns the stored row, or `None` when the guard did not match.
    async fn save_transition(
        &self,
        ticket: &Ticket,
        from_status: TicketStatus,
        from_order: u32,
    ) -> Result<Option<Ticket>, RepositoryError>;

    async fn list_pending(
        &self,
        department_id: &DepartmentId,
        limit: u32,
    ) -> Result<Vec<Ticket>, RepositoryError>;
}

#[async_trait]
pub trait DepartmentAdminRepository: Send + Sync {
    async fn list_for_department(
        &self,
        department_id: &DepartmentId,
    ) -> Result<Vec<DepartmentAdmin>, RepositoryError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<DepartmentAdmin>, RepositoryError>;

    async fn save(&self, admin: DepartmentAdmin) -> Result<(), RepositoryError>;

    /// Returns whether a roster entry was removed.
    async fn remove(
        &self,
        department_id: &DepartmentId,
        user_id: &str,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait TicketActivityRepository: Send + Sync {
    async fn append(&self, activity: TicketActivity) -> Result<(), RepositoryError>;

    async fn list_for_ticket(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<TicketActivity>, RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ShiftAttendanceRepository: Send + Sync {
    async fn list_open(&self) -> Result<Vec<ShiftAttendance>, RepositoryError>;

    async fn save(&self, attendance: ShiftAttendance) -> Result<(), RepositoryError>;
}

pub(crate) fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}
