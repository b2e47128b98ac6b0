use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Staff,
    Admin,
    Owner,
    Superadmin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(format!(
                "invalid role '{other}'. Allowed roles: staff, admin, owner, superadmin"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permissions {
    pub can_manage_users: bool,
    pub can_manage_company: bool,
    pub can_view_financials: bool,
    pub can_manage_invoices: bool,
    pub can_delete_records: bool,
    pub can_switch_company: bool,
    pub can_use_god_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageUsers,
    ManageCompany,
    ViewFinancials,
    ManageInvoices,
    DeleteRecords,
    SwitchCompany,
    UseGodMode,
}

impl Permissions {
    pub const fn for_role(role: Role) -> Self {
        let admin = matches!(role, Role::Admin | Role::Owner | Role::Superadmin);
        Self {
            can_manage_users: admin,
            can_manage_company: matches!(role, Role::Owner | Role::Superadmin),
            can_view_financials: admin,
            can_manage_invoices: admin,
            can_delete_records: admin,
            can_switch_company: admin,
            can_use_god_mode: matches!(role, Role::Superadmin),
        }
    }

    pub const fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageUsers => self.can_manage_users,
            Capability::ManageCompany => self.can_manage_company,
            Capability::ViewFinancials => self.can_view_financials,
            Capability::ManageInvoices => self.can_manage_invoices,
            Capability::DeleteRecords => self.can_delete_records,
            Capability::SwitchCompany => self.can_switch_company,
            Capability::UseGodMode => self.can_use_god_mode,
        }
    }

    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(AppError::forbidden("insufficient permissions"))
        }
    }
}
