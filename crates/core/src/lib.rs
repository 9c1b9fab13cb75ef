pub mod action_token;
pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod shifts;
pub mod workflow;

pub use action_token::{ActionClaims, ActionTokenError, ActionTokenSigner};
pub use approvals::{is_next_approver, ApprovalRoster, EligibilityFailure, EligibilityResult};
pub use domain::department::{AdminTier, DepartmentAdmin, DepartmentId};
pub use domain::shift::{ShiftAttendance, ShiftWindow};
pub use domain::ticket::{NewTicket, Ticket, TicketActivity, TicketId, TicketStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{Notification, Notifier, NotifyError};
pub use shifts::{OverdueCheck, OverdueReminder};
pub use workflow::{
    NotificationKind, SideEffect, TicketAction, TicketWorkflow, TransitionOutcome, WorkflowError,
};
