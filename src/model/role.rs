use serde::Serialize;
use strum_macros::{AsRefStr, EnumIter};
use utoipa::ToSchema;

use crate::model::permission::Permission;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema, AsRefStr, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    Manager = 4,
    MrsCoordinator = 5,
    AssetManager = 6,
    Accounting = 7,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::Manager),
            5 => Some(Role::MrsCoordinator),
            6 => Some(Role::AssetManager),
            7 => Some(Role::Accounting),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Permissions granted on top of what every signed-in user can do.
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Admin => Permission::ALL,
            Role::Hr => &[
                ApproveAsManager,
                ApproveAsHr,
                ViewAllRequests,
                ManageLeaveBalances,
                ManageUsers,
                ManageDepartments,
            ],
            Role::Manager => &[ApproveAsManager],
            Role::MrsCoordinator => &[CoordinateMaterialRequests],
            Role::AssetManager => &[ManageAssets, RunDepreciation],
            Role::Accounting => &[ManageGlAccounts, RunDepreciation],
            Role::Employee => &[],
        }
    }

    pub fn has(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn ids_round_trip() {
        for role in Role::iter() {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(8), None);
    }

    #[test]
    fn admin_holds_every_permission() {
        for p in Permission::ALL {
            assert!(Role::Admin.has(*p), "admin lacks {p:?}");
        }
    }

    #[test]
    fn calendar_override_is_admin_only() {
        for role in Role::iter().filter(|r| *r != Role::Admin) {
            assert!(!role.has(Permission::OverrideDepreciationCalendar));
        }
    }

    #[test]
    fn employee_has_no_elevated_permissions() {
        assert!(Role::Employee.permissions().is_empty());
    }

    #[test]
    fn manager_cannot_act_at_hr_stage() {
        assert!(Role::Manager.has(Permission::ApproveAsManager));
        assert!(!Role::Manager.has(Permission::ApproveAsHr));
    }

    #[test]
    fn serialized_names_are_screaming_snake() {
        assert_eq!(Role::MrsCoordinator.as_ref(), "MRS_COORDINATOR");
        assert_eq!(
            serde_json::to_value(Role::AssetManager).unwrap(),
            serde_json::json!("ASSET_MANAGER")
        );
    }
}
