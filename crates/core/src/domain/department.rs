use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminTier {
    Regular,
    Purchase,
}

impl AdminTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Purchase => "purchase",
        }
    }
}

/// One row of a department's approval roster.
///
/// Several admins may share an `admin_order`; they are parallel approvers at
/// that tier and any one of them can move the ticket forward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentAdmin {
    pub department_id: DepartmentId,
    pub user_id: String,
    pub admin_order: u32,
    pub is_purchase_admin: bool,
}

impl DepartmentAdmin {
    pub fn regular(department_id: &DepartmentId, user_id: &str, admin_order: u32) -> Self {
        Self {
            department_id: department_id.clone(),
            user_id: user_id.to_string(),
            admin_order,
            is_purchase_admin: false,
        }
    }

    pub fn purchase(department_id: &DepartmentId, user_id: &str, admin_order: u32) -> Self {
        Self {
            department_id: department_id.clone(),
            user_id: user_id.to_string(),
            admin_order,
            is_purchase_admin: true,
        }
    }

    pub fn tier(&self) -> AdminTier {
        if self.is_purchase_admin {
            AdminTier::Purchase
        } else {
            AdminTier::Regular
        }
    }
}
