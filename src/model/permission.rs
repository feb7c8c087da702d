use serde::Serialize;
use strum_macros::AsRefStr;
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ManageBusinessUnits,
    ManageUsers,
    ManageDepartments,
    ApproveAsManager,
    ApproveAsHr,
    ViewAllRequests,
    ManageLeaveBalances,
    CoordinateMaterialRequests,
    ManageAssets,
    RunDepreciation,
    OverrideDepreciationCalendar,
    ManageGlAccounts,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::ManageBusinessUnits,
        Permission::ManageUsers,
        Permission::ManageDepartments,
        Permission::ApproveAsManager,
        Permission::ApproveAsHr,
        Permission::ViewAllRequests,
        Permission::ManageLeaveBalances,
        Permission::CoordinateMaterialRequests,
        Permission::ManageAssets,
        Permission::RunDepreciation,
        Permission::OverrideDepreciationCalendar,
        Permission::ManageGlAccounts,
    ];
}
