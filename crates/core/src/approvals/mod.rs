//! Department approval chains.
//!
//! Tickets climb a department roster one `admin_order` at a time. Regular
//! tickets only ever involve regular admins. Purchase tickets interleave the
//! two tiers per order: while a regular admin sits at the ticket's current
//! order, purchase admins at that order wait; an order with no regular admin
//! hands the decision to the purchase admins sharing it.

use serde::{Deserialize, Serialize};

use crate::domain::department::{AdminTier, DepartmentAdmin, DepartmentId};
use crate::domain::ticket::{Ticket, TicketStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EligibilityFailure {
    TicketNotPending { status: TicketStatus },
    NotDepartmentAdmin { user_id: String, department_id: String },
    WrongOrder { user_id: String, admin_order: u32, next_admin_order: u32 },
    PurchaseAdminOnRegularTicket { user_id: String },
    WaitingOnRegularAdmins { user_id: String, admin_order: u32 },
}

impl EligibilityFailure {
    pub fn reason(&self) -> String {
        match self {
            Self::TicketNotPending { status } => {
                format!("ticket is already {}", status.as_str())
            }
            Self::NotDepartmentAdmin { user_id, department_id } => {
                format!("user `{user_id}` is not an admin of department `{department_id}`")
            }
            Self::WrongOrder { user_id, admin_order, next_admin_order } => {
                format!(
                    "user `{user_id}` approves at order {admin_order} but the ticket waits on order {next_admin_order}"
                )
            }
            Self::PurchaseAdminOnRegularTicket { user_id } => {
                format!("purchase admin `{user_id}` cannot act on a non-purchase ticket")
            }
            Self::WaitingOnRegularAdmins { user_id, admin_order } => {
                format!(
                    "purchase admin `{user_id}` waits for the regular admins at order {admin_order}"
                )
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<EligibilityFailure>,
}

impl EligibilityResult {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None }
    }

    fn deny(failure: EligibilityFailure) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure) }
    }
}

/// Admins of a single department, ready to answer "who acts next".
#[derive(Clone, Debug)]
pub struct ApprovalRoster {
    department_id: DepartmentId,
    admins: Vec<DepartmentAdmin>,
}

impl ApprovalRoster {
    /// Keeps only the admins belonging to `department_id`.
    pub fn for_department(department_id: &DepartmentId, admins: Vec<DepartmentAdmin>) -> Self {
        let mut admins: Vec<DepartmentAdmin> =
            admins.into_iter().filter(|admin| &admin.department_id == department_id).collect();
        admins.sort_by(|left, right| {
            left.admin_order
                .cmp(&right.admin_order)
                .then(left.is_purchase_admin.cmp(&right.is_purchase_admin))
                .then(left.user_id.cmp(&right.user_id))
        });
        Self { department_id: department_id.clone(), admins }
    }

    pub fn department_id(&self) -> &DepartmentId {
        &self.department_id
    }

    pub fn admins(&self) -> &[DepartmentAdmin] {
        &self.admins
    }

    pub fn find(&self, user_id: &str) -> Option<&DepartmentAdmin> {
        self.admins.iter().find(|admin| admin.user_id == user_id)
    }

    fn has_tier_at(&self, tier: AdminTier, order: u32) -> bool {
        self.admins.iter().any(|admin| admin.admin_order == order && admin.tier() == tier)
    }

    /// The tier allowed to decide at the ticket's current order.
    pub fn active_tier(&self, ticket: &Ticket) -> Option<AdminTier> {
        let order = ticket.next_admin_order;
        if self.has_tier_at(AdminTier::Regular, order) {
            return Some(AdminTier::Regular);
        }
        if ticket.is_purchase_ticket && self.has_tier_at(AdminTier::Purchase, order) {
            return Some(AdminTier::Purchase);
        }
        None
    }

    pub fn eligible_approvers(&self, ticket: &Ticket) -> Vec<&DepartmentAdmin> {
        if !ticket.is_pending() || ticket.department_id != self.department_id {
            return Vec::new();
        }
        let Some(tier) = self.active_tier(ticket) else {
            return Vec::new();
        };
        self.admins
            .iter()
            .filter(|admin| admin.admin_order == ticket.next_admin_order && admin.tier() == tier)
            .collect()
    }

    /// Whether an admin relevant to the ticket sits at any order above `order`.
    pub fn has_tier_after(&self, ticket: &Ticket, order: u32) -> bool {
        self.admins
            .iter()
            .filter(|admin| ticket.is_purchase_ticket || !admin.is_purchase_admin)
            .any(|admin| admin.admin_order > order)
    }

    /// A pending ticket whose current order nobody can act on.
    ///
    /// Such tickets never move again; they are reported, not skipped.
    pub fn is_stalled(&self, ticket: &Ticket) -> bool {
        ticket.is_pending() && self.active_tier(ticket).is_none()
    }

    pub fn check_eligibility(&self, ticket: &Ticket, user_id: &str) -> EligibilityResult {
        if !ticket.is_pending() {
            return EligibilityResult::deny(EligibilityFailure::TicketNotPending {
                status: ticket.status,
            });
        }

        let viewer = self.find(user_id).filter(|_| ticket.department_id == self.department_id);
        let Some(viewer) = viewer else {
            return EligibilityResult::deny(EligibilityFailure::NotDepartmentAdmin {
                user_id: user_id.to_string(),
                department_id: ticket.department_id.0.clone(),
            });
        };

        if viewer.admin_order != ticket.next_admin_order {
            return EligibilityResult::deny(EligibilityFailure::WrongOrder {
                user_id: user_id.to_string(),
                admin_order: viewer.admin_order,
                next_admin_order: ticket.next_admin_order,
            });
        }

        if viewer.is_purchase_admin {
            if !ticket.is_purchase_ticket {
                return EligibilityResult::deny(
                    EligibilityFailure::PurchaseAdminOnRegularTicket {
                        user_id: user_id.to_string(),
                    },
                );
            }
            if self.has_tier_at(AdminTier::Regular, ticket.next_admin_order) {
                return EligibilityResult::deny(EligibilityFailure::WaitingOnRegularAdmins {
                    user_id: user_id.to_string(),
                    admin_order: ticket.next_admin_order,
                });
            }
        }

        EligibilityResult::allow(format!(
            "{} admin `{}` is the next approver at order {}",
            viewer.tier().as_str(),
            user_id,
            ticket.next_admin_order
        ))
    }
}

/// Stateless form of [`ApprovalRoster::check_eligibility`] for callers that
/// already hold the viewer's roster entry.
pub fn is_next_approver(
    ticket: &Ticket,
    viewer: &DepartmentAdmin,
    department_admins: &[DepartmentAdmin],
) -> bool {
    let roster = ApprovalRoster::for_department(&ticket.department_id, department_admins.to_vec());
    viewer.department_id == ticket.department_id
        && roster.check_eligibility(ticket, &viewer.user_id).allowed
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{is_next_approver, ApprovalRoster, EligibilityFailure};
    use crate::domain::department::{AdminTier, DepartmentAdmin, DepartmentId};
    use crate::domain::ticket::{NewTicket, Ticket, TicketStatus};

    fn dept() -> DepartmentId {
        DepartmentId("DEP-1".to_string())
    }

    fn ticket(is_purchase: bool, order: u32) -> Ticket {
        let mut ticket = Ticket::submit(
            NewTicket {
                department_id: dept(),
                title: "Laptop".to_string(),
                description: String::new(),
                created_by: "requester".to_string(),
                is_purchase_ticket: is_purchase,
                purchase_amount: None,
            },
            Utc::now(),
        )
        .expect("submit");
        ticket.next_admin_order = order;
        ticket
    }

    fn roster() -> Vec<DepartmentAdmin> {
        vec![
            DepartmentAdmin::regular(&dept(), "reg-0", 0),
            DepartmentAdmin::regular(&dept(), "reg-1", 1),
            DepartmentAdmin::purchase(&dept(), "pur-1", 1),
            DepartmentAdmin::purchase(&dept(), "pur-2", 2),
        ]
    }

    #[test]
    fn regular_ticket_only_admits_regular_admins_at_current_order() {
        let admins = roster();
        let ticket = ticket(false, 1);

        assert!(is_next_approver(&ticket, &admins[1], &admins));
        assert!(!is_next_approver(&ticket, &admins[0], &admins));
        assert!(!is_next_approver(&ticket, &admins[2], &admins));
    }

    #[test]
    fn purchase_ticket_prefers_regular_admin_sharing_the_order() {
        let admins = roster();
        let ticket = ticket(true, 1);

        assert!(is_next_approver(&ticket, &admins[1], &admins));
        assert!(!is_next_approver(&ticket, &admins[2], &admins));

        let roster = ApprovalRoster::for_department(&dept(), admins);
        let failure = roster.check_eligibility(&ticket, "pur-1").failure;
        assert_eq!(
            failure,
            Some(EligibilityFailure::WaitingOnRegularAdmins {
                user_id: "pur-1".to_string(),
                admin_order: 1
            })
        );
    }

    #[test]
    fn purchase_admin_decides_when_no_regular_admin_holds_the_order() {
        let admins = roster();
        let ticket = ticket(true, 2);
        let roster = ApprovalRoster::for_department(&dept(), admins.clone());

        assert!(is_next_approver(&ticket, &admins[3], &admins));
        assert_eq!(roster.active_tier(&ticket), Some(AdminTier::Purchase));
        let eligible: Vec<&str> =
            roster.eligible_approvers(&ticket).iter().map(|a| a.user_id.as_str()).collect();
        assert_eq!(eligible, vec!["pur-2"]);
    }

    #[test]
    fn parallel_admins_at_one_order_are_all_eligible() {
        let mut admins = roster();
        admins.push(DepartmentAdmin::regular(&dept(), "reg-0b", 0));
        let roster = ApprovalRoster::for_department(&dept(), admins);
        let ticket = ticket(false, 0);

        let eligible: Vec<&str> =
            roster.eligible_approvers(&ticket).iter().map(|a| a.user_id.as_str()).collect();
        assert_eq!(eligible, vec!["reg-0", "reg-0b"]);
    }

    #[test]
    fn admins_of_other_departments_are_ignored() {
        let mut admins = roster();
        let other = DepartmentAdmin::regular(&DepartmentId("DEP-2".to_string()), "outsider", 0);
        admins.push(other.clone());
        let ticket = ticket(false, 0);

        assert!(!is_next_approver(&ticket, &other, &admins));
        let roster = ApprovalRoster::for_department(&dept(), admins);
        assert!(roster.find("outsider").is_none());
    }

    #[test]
    fn decided_tickets_have_no_next_approver() {
        let admins = roster();
        let mut ticket = ticket(false, 0);
        ticket.status = TicketStatus::Rejected;

        assert!(!is_next_approver(&ticket, &admins[0], &admins));
        let roster = ApprovalRoster::for_department(&dept(), admins);
        assert!(roster.eligible_approvers(&ticket).is_empty());
        assert!(!roster.is_stalled(&ticket));
    }

    #[test]
    fn order_without_relevant_admin_is_reported_as_stalled() {
        let admins = vec![
            DepartmentAdmin::regular(&dept(), "reg-0", 0),
            DepartmentAdmin::purchase(&dept(), "pur-1", 1),
            DepartmentAdmin::regular(&dept(), "reg-3", 3),
        ];
        let roster = ApprovalRoster::for_department(&dept(), admins);

        assert!(roster.is_stalled(&ticket(false, 1)));
        assert!(!roster.is_stalled(&ticket(true, 1)));
        assert!(roster.is_stalled(&ticket(true, 2)));
    }

    #[test]
    fn later_tiers_depend_on_ticket_kind() {
        let admins = vec![
            DepartmentAdmin::regular(&dept(), "reg-0", 0),
            DepartmentAdmin::purchase(&dept(), "pur-1", 1),
        ];
        let roster = ApprovalRoster::for_department(&dept(), admins);

        assert!(!roster.has_tier_after(&ticket(false, 0), 0));
        assert!(roster.has_tier_after(&ticket(true, 0), 0));
        assert!(!roster.has_tier_after(&ticket(true, 1), 1));
    }

    #[test]
    fn purchase_admin_sharing_a_regular_order_is_bypassed_to_completion() {
        let admins = vec![
            DepartmentAdmin::regular(&dept(), "reg-0", 0),
            DepartmentAdmin::regular(&dept(), "reg-1", 1),
            DepartmentAdmin::purchase(&dept(), "pur-1", 1),
        ];
        let roster = ApprovalRoster::for_department(&dept(), admins);
        let at_one = ticket(true, 1);

        let eligible: Vec<&str> =
            roster.eligible_approvers(&at_one).iter().map(|a| a.user_id.as_str()).collect();
        assert_eq!(eligible, vec!["reg-1"]);
        // Interleaving is per order: once reg-1 approves nothing relevant is left,
        // so the purchase admin at order 1 never gets a turn.
        assert!(!roster.has_tier_after(&at_one, 1));
    }
}
