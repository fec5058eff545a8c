//! Role entity - user roles
//!
//! Table: fildas_role

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Capability tier a role name maps onto
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    /// Admin of every department
    SuperAdmin,
    /// Admin of the user's own department
    Admin,
    Staff,
}

impl RoleKind {
    pub const ALL: [RoleKind; 3] = [RoleKind::SuperAdmin, RoleKind::Admin, RoleKind::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::SuperAdmin => "Super Admin",
            RoleKind::Admin => "Admin",
            RoleKind::Staff => "Staff",
        }
    }

    /// Lenient match on the stored role name ("Super Admin", "super_admin", "superadmin")
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "superadmin" => Some(RoleKind::SuperAdmin),
            "admin" => Some(RoleKind::Admin),
            "staff" => Some(RoleKind::Staff),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, RoleKind::SuperAdmin | RoleKind::Admin)
    }

    pub fn description(&self) -> &'static str {
        match self {
            RoleKind::SuperAdmin => "Full access to every department",
            RoleKind::Admin => "Manages one department and reviews its documents",
            RoleKind::Staff => "Uploads and organizes documents",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fildas_role")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(32))", unique)]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn kind(&self) -> Option<RoleKind> {
        RoleKind::from_name(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_are_matched_leniently() {
        assert_eq!(RoleKind::from_name("Super Admin"), Some(RoleKind::SuperAdmin));
        assert_eq!(RoleKind::from_name("super_admin"), Some(RoleKind::SuperAdmin));
        assert_eq!(RoleKind::from_name("ADMIN"), Some(RoleKind::Admin));
        assert_eq!(RoleKind::from_name("staff"), Some(RoleKind::Staff));
        assert_eq!(RoleKind::from_name("guest"), None);
    }

    #[test]
    fn only_admin_tiers_are_admin() {
        assert!(RoleKind::SuperAdmin.is_admin());
        assert!(RoleKind::Admin.is_admin());
        assert!(!RoleKind::Staff.is_admin());
    }
}
