use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::department::DepartmentId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl TicketId {
    pub fn generate() -> Self {
        Self(format!("TKT-{}", &Uuid::new_v4().simple().to_string()[..12]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Approved,
    Rejected,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Closed)
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "closed" => Ok(Self::Closed),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown ticket status `{other}`")))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub department_id: DepartmentId,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub status: TicketStatus,
    pub is_purchase_ticket: bool,
    pub purchase_amount: Option<Decimal>,
    pub next_admin_order: u32,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub department_id: DepartmentId,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub is_purchase_ticket: bool,
    pub purchase_amount: Option<Decimal>,
}

impl Ticket {
    /// Opens a ticket at the first approval order.
    pub fn submit(new: NewTicket, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if new.title.trim().is_empty() {
            return Err(DomainError::InvariantViolation("ticket title is required".to_string()));
        }
        if new.department_id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "ticket department is required".to_string(),
            ));
        }
        if new.created_by.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "ticket requester is required".to_string(),
            ));
        }
        if let Some(amount) = new.purchase_amount {
            if amount.is_sign_negative() {
                return Err(DomainError::InvariantViolation(
                    "purchase amount cannot be negative".to_string(),
                ));
            }
        }

        Ok(Self {
            id: TicketId::generate(),
            department_id: new.department_id,
            title: new.title.trim().to_string(),
            description: new.description,
            created_by: new.created_by.trim().to_string(),
            status: TicketStatus::Pending,
            is_purchase_ticket: new.is_purchase_ticket,
            purchase_amount: new.purchase_amount,
            next_admin_order: 0,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == TicketStatus::Pending
    }
}

/// One line of a ticket's activity history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketActivity {
    pub id: String,
    pub ticket_id: TicketId,
    pub action: String,
    pub actor: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl TicketActivity {
    pub fn new(
        ticket_id: &TicketId,
        action: impl Into<String>,
        actor: impl Into<String>,
        detail: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("ACT-{}", Uuid::new_v4().simple()),
            ticket_id: ticket_id.clone(),
            action: action.into(),
            actor: actor.into(),
            detail: detail.into(),
            created_at,
        }
    }
}
