use crate::api::asset::{
    AssetListResponse, CreateAsset, DeployBody, Holder, QrCode, QrLookup, RetireBody,
    RetireSummary, ReturnBody, UpdateAsset,
};
use crate::api::approval::DecisionBody;
use crate::api::business_unit::{CreateBusinessUnit, UpdateBusinessUnit};
use crate::api::department::CreateDepartment;
use crate::api::depreciation::{PostedLine, RunDepreciation, RunSummary, SkippedAsset};
use crate::api::gl_account::{CreateGlAccount, GlAccountListResponse, UpdateGlAccount};
use crate::api::leave_request::{CreateLeave, LeaveFilter, LeaveListResponse, SetBalance};
use crate::api::material_request::{
    CompleteEditBody, ItemDescription, ItemInput, MaterialListResponse, MaterialRequestDetail,
    MaterialRequestInput, PostBody, ReasonBody, ServeBody, ServeLine,
};
use crate::api::me::Me;
use crate::api::overtime_request::{CreateOvertime, OvertimeListResponse};
use crate::api::user::{CreateUser, UpdateUser, UserListResponse};
use crate::auth::handlers::TokenPair;
use crate::domain::{
    approval::ApprovalStatus,
    asset::AssetStatus,
    depreciation::{DepreciationMethod, ScheduleLine, SkipReason},
    leave::LeaveType,
    ledger::{AccountType, NormalBalance},
    material::MaterialStatus,
};
use crate::model::{
    asset::{Asset, AssetDeployment, DepreciationEntry},
    business_unit::BusinessUnit,
    department::Department,
    gl_account::GlAccount,
    leave_request::{LeaveBalance, LeaveRequest},
    material_request::{MaterialRequest, MaterialRequestItem},
    overtime_request::OvertimeRequest,
    permission::Permission,
    role::Role,
    user::User,
};
use crate::models::LoginReqDto;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BizAdmin API",
        version = "1.0.0",
        description = r#"
## Business Administration Back Office

Multi-tenant API for the day-to-day administration of business units.

### Key Features
- **Leave & Overtime**
  - File requests, two-stage approval (manager, then HR), leave balances
- **Material Requisitions**
  - Drafts, two approvers, edit round-trips, serving and posting
- **Fixed Assets**
  - Registry, deployments, QR lookup, retirement and disposal
- **Depreciation & GL Accounts**
  - Monthly depreciation runs, schedules and a chart of accounts

### Security
Every `/api` endpoint requires a **JWT Bearer** access token. Data is always
scoped to the caller's business unit; records outside it answer 404.

### Response Format
- JSON bodies, errors as `{"message": "..."}`
- List endpoints return `{data, page, per_page, total}`
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::me::me,

        crate::api::business_unit::create_business_unit,
        crate::api::business_unit::business_unit_list,
        crate::api::business_unit::get_business_unit,
        crate::api::business_unit::update_business_unit,

        crate::api::department::create_department,
        crate::api::department::department_list,

        crate::api::user::create_user,
        crate::api::user::username_available,
        crate::api::user::user_list,
        crate::api::user::get_user,
        crate::api::user::update_user,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::leave_balances,
        crate::api::leave_request::set_leave_balance,

        crate::api::overtime_request::create_overtime,
        crate::api::overtime_request::approve_overtime,
        crate::api::overtime_request::reject_overtime,
        crate::api::overtime_request::get_overtime,
        crate::api::overtime_request::overtime_list,

        crate::api::material_request::create_material_request,
        crate::api::material_request::update_draft,
        crate::api::material_request::submit,
        crate::api::material_request::cancel,
        crate::api::material_request::rec_approve,
        crate::api::material_request::final_approve,
        crate::api::material_request::reject,
        crate::api::material_request::mark_for_edit,
        crate::api::material_request::complete_edit,
        crate::api::material_request::acknowledge,
        crate::api::material_request::serve,
        crate::api::material_request::post,
        crate::api::material_request::get_material_request,
        crate::api::material_request::material_request_list,

        crate::api::asset::create_asset,
        crate::api::asset::asset_list,
        crate::api::asset::get_asset,
        crate::api::asset::update_asset,
        crate::api::asset::deploy_asset,
        crate::api::asset::return_asset,
        crate::api::asset::deployment_history,
        crate::api::asset::asset_qr,
        crate::api::asset::qr_lookup,
        crate::api::asset::retire_assets,
        crate::api::asset::dispose_asset,

        crate::api::depreciation::run_depreciation,
        crate::api::depreciation::depreciation_schedule,
        crate::api::depreciation::depreciation_history,

        crate::api::gl_account::create_gl_account,
        crate::api::gl_account::gl_account_list,
        crate::api::gl_account::get_gl_account,
        crate::api::gl_account::update_gl_account,
        crate::api::gl_account::activate_gl_account,
        crate::api::gl_account::deactivate_gl_account
    ),
    components(
        schemas(
            LoginReqDto,
            TokenPair,
            Me,
            Role,
            Permission,
            BusinessUnit,
            CreateBusinessUnit,
            UpdateBusinessUnit,
            Department,
            CreateDepartment,
            User,
            CreateUser,
            UpdateUser,
            UserListResponse,
            ApprovalStatus,
            DecisionBody,
            LeaveType,
            LeaveRequest,
            LeaveBalance,
            CreateLeave,
            SetBalance,
            LeaveFilter,
            LeaveListResponse,
            OvertimeRequest,
            CreateOvertime,
            OvertimeListResponse,
            MaterialStatus,
            MaterialRequest,
            MaterialRequestItem,
            MaterialRequestDetail,
            MaterialRequestInput,
            ItemInput,
            ItemDescription,
            CompleteEditBody,
            ReasonBody,
            ServeLine,
            ServeBody,
            PostBody,
            MaterialListResponse,
            AssetStatus,
            Asset,
            AssetDeployment,
            AssetListResponse,
            CreateAsset,
            UpdateAsset,
            DeployBody,
            ReturnBody,
            QrCode,
            Holder,
            QrLookup,
            RetireBody,
            RetireSummary,
            DepreciationMethod,
            DepreciationEntry,
            ScheduleLine,
            SkipReason,
            RunDepreciation,
            PostedLine,
            SkippedAsset,
            RunSummary,
            AccountType,
            NormalBalance,
            GlAccount,
            CreateGlAccount,
            UpdateGlAccount,
            GlAccountListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token rotation"),
        (name = "Business Units", description = "Tenant administration"),
        (name = "Departments", description = "Departments per business unit"),
        (name = "Users", description = "User administration and the current profile"),
        (name = "Leave", description = "Leave requests and balances"),
        (name = "Overtime", description = "Overtime requests"),
        (name = "Material Requests", description = "Material requisition workflow"),
        (name = "Assets", description = "Fixed asset registry"),
        (name = "Depreciation", description = "Depreciation runs and schedules"),
        (name = "GL Accounts", description = "Chart of accounts"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_bearer_scheme_and_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.as_ref().unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/api/assets/{asset_id}/deploy"));
        assert!(doc.paths.paths.contains_key("/api/material-requests/{id}/serve"));
        assert!(doc.paths.paths.contains_key("/auth/login"));
    }
}
