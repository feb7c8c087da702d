//! Manager → HR approval chain shared by leave and overtime requests.
//!
//! ```text
//! PENDING_MANAGER ──approve──▶ PENDING_HR ──approve──▶ APPROVED
//!        │                          │
//!        └────────reject────────────┴──────▶ REJECTED
//! ```
//!
//! The functions here only decide; persisting the outcome is done by the
//! caller with a conditional update on the status it read.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::permission::Permission;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    PendingManager,
    PendingHr,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }
}

impl TryFrom<String> for ApprovalStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What the decision function needs to know about a request and its owner.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: u64,
    pub business_unit_id: u64,
    pub owner_id: u64,
    /// Direct manager of the owner at decision time
    pub owner_manager_id: Option<u64>,
    pub status: ApprovalStatus,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Stage {
    Manager,
    Hr,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Transition {
    pub stage: Stage,
    pub from: ApprovalStatus,
    pub to: ApprovalStatus,
}

fn check_common(actor: &AuthUser, ctx: &RequestContext) -> AppResult<()> {
    if actor.business_unit_id != ctx.business_unit_id {
        return Err(AppError::forbidden("Request belongs to another business unit"));
    }
    if actor.user_id == ctx.owner_id {
        return Err(AppError::forbidden("You cannot act on your own request"));
    }
    Ok(())
}

fn check_comments(decision: Decision, comments: Option<&str>) -> AppResult<()> {
    let blank = comments.map(str::trim).is_none_or(str::is_empty);
    if decision == Decision::Reject && blank {
        return Err(AppError::validation("A comment is required when rejecting"));
    }
    Ok(())
}

/// First stage. The owner's direct manager decides; an admin may stand in,
/// which also covers owners without a manager.
pub fn manager_decision(
    actor: &AuthUser,
    ctx: &RequestContext,
    decision: Decision,
    comments: Option<&str>,
) -> AppResult<Transition> {
    if ctx.status != ApprovalStatus::PendingManager {
        return Err(AppError::conflict(format!(
            "Request is {}, not awaiting manager approval",
            ctx.status.as_ref()
        )));
    }
    check_common(actor, ctx)?;

    let is_direct_manager = ctx.owner_manager_id == Some(actor.user_id)
        && actor.can(Permission::ApproveAsManager);
    if !is_direct_manager && !actor.is_admin() {
        return Err(AppError::forbidden(
            "Only the requester's direct manager can act at this stage",
        ));
    }
    check_comments(decision, comments)?;

    let to = match decision {
        Decision::Approve => ApprovalStatus::PendingHr,
        Decision::Reject => ApprovalStatus::Rejected,
    };
    Ok(Transition {
        stage: Stage::Manager,
        from: ctx.status,
        to,
    })
}

/// Second stage, reachable only after the manager approved.
pub fn hr_decision(
    actor: &AuthUser,
    ctx: &RequestContext,
    decision: Decision,
    comments: Option<&str>,
) -> AppResult<Transition> {
    if ctx.status != ApprovalStatus::PendingHr {
        return Err(AppError::conflict(format!(
            "Request is {}, not awaiting HR approval",
            ctx.status.as_ref()
        )));
    }
    check_common(actor, ctx)?;
    actor.require(Permission::ApproveAsHr)?;
    check_comments(decision, comments)?;

    let to = match decision {
        Decision::Approve => ApprovalStatus::Approved,
        Decision::Reject => ApprovalStatus::Rejected,
    };
    Ok(Transition {
        stage: Stage::Hr,
        from: ctx.status,
        to,
    })
}

/// Routes a decision to the stage the request is currently in.
pub fn decide(
    actor: &AuthUser,
    ctx: &RequestContext,
    decision: Decision,
    comments: Option<&str>,
) -> AppResult<Transition> {
    if ctx.status.is_terminal() {
        return Err(AppError::conflict(format!(
            "Request already {}",
            ctx.status.as_ref()
        )));
    }
    match ctx.status {
        ApprovalStatus::PendingManager => manager_decision(actor, ctx, decision, comments),
        _ => hr_decision(actor, ctx, decision, comments),
    }
}

/// Owners see their own requests, managers their direct reports,
/// HR and admins the whole business unit.
pub fn can_view(actor: &AuthUser, ctx: &RequestContext) -> bool {
    if actor.business_unit_id != ctx.business_unit_id {
        return false;
    }
    actor.user_id == ctx.owner_id
        || ctx.owner_manager_id == Some(actor.user_id)
        || actor.can(Permission::ViewAllRequests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    const BU: u64 = 1;
    const OWNER: u64 = 100;
    const MANAGER: u64 = 200;

    fn user(user_id: u64, role: Role) -> AuthUser {
        AuthUser {
            user_id,
            username: format!("user{user_id}"),
            role,
            business_unit_id: BU,
        }
    }

    fn ctx(status: ApprovalStatus) -> RequestContext {
        RequestContext {
            id: 1,
            business_unit_id: BU,
            owner_id: OWNER,
            owner_manager_id: Some(MANAGER),
            status,
        }
    }

    #[test]
    fn full_chain_reaches_approved() {
        let manager = user(MANAGER, Role::Manager);
        let hr = user(300, Role::Hr);

        let first = decide(&manager, &ctx(ApprovalStatus::PendingManager), Decision::Approve, None)
            .unwrap();
        assert_eq!(first.stage, Stage::Manager);
        assert_eq!(first.to, ApprovalStatus::PendingHr);

        let second = decide(&hr, &ctx(first.to), Decision::Approve, None).unwrap();
        assert_eq!(second.stage, Stage::Hr);
        assert_eq!(second.to, ApprovalStatus::Approved);
    }

    #[test]
    fn hr_cannot_skip_manager_stage() {
        let hr = user(300, Role::Hr);
        let err = hr_decision(&hr, &ctx(ApprovalStatus::PendingManager), Decision::Approve, None)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn hr_who_is_not_the_direct_manager_is_refused_at_manager_stage() {
        let hr = user(300, Role::Hr);
        let err = decide(&hr, &ctx(ApprovalStatus::PendingManager), Decision::Approve, None)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn other_manager_is_refused() {
        let stranger = user(999, Role::Manager);
        let err = decide(&stranger, &ctx(ApprovalStatus::PendingManager), Decision::Approve, None)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn admin_stands_in_for_missing_manager() {
        let admin = user(1, Role::Admin);
        let mut c = ctx(ApprovalStatus::PendingManager);
        c.owner_manager_id = None;
        let t = decide(&admin, &c, Decision::Approve, None).unwrap();
        assert_eq!(t.to, ApprovalStatus::PendingHr);
    }

    #[test]
    fn rejection_is_absorbing() {
        let hr = user(300, Role::Hr);
        let admin = user(1, Role::Admin);
        for status in [ApprovalStatus::Rejected, ApprovalStatus::Approved] {
            assert!(matches!(
                decide(&hr, &ctx(status), Decision::Approve, None),
                Err(AppError::Conflict(_))
            ));
            assert!(matches!(
                decide(&admin, &ctx(status), Decision::Reject, Some("late")),
                Err(AppError::Conflict(_))
            ));
        }
    }

    #[test]
    fn reject_from_either_pending_state() {
        let manager = user(MANAGER, Role::Manager);
        let hr = user(300, Role::Hr);

        let t = decide(&manager, &ctx(ApprovalStatus::PendingManager), Decision::Reject, Some("no cover"))
            .unwrap();
        assert_eq!(t.to, ApprovalStatus::Rejected);

        let t = decide(&hr, &ctx(ApprovalStatus::PendingHr), Decision::Reject, Some("policy"))
            .unwrap();
        assert_eq!(t.to, ApprovalStatus::Rejected);
    }

    #[test]
    fn rejection_needs_a_comment() {
        let manager = user(MANAGER, Role::Manager);
        let err = decide(&manager, &ctx(ApprovalStatus::PendingManager), Decision::Reject, Some("  "))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn owner_cannot_approve_own_request() {
        let owner_as_hr = user(OWNER, Role::Hr);
        let err = decide(&owner_as_hr, &ctx(ApprovalStatus::PendingHr), Decision::Approve, None)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn other_business_unit_is_refused() {
        let mut hr = user(300, Role::Hr);
        hr.business_unit_id = 2;
        let err = decide(&hr, &ctx(ApprovalStatus::PendingHr), Decision::Approve, None)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(!can_view(&hr, &ctx(ApprovalStatus::PendingHr)));
    }

    #[test]
    fn visibility_rules() {
        let c = ctx(ApprovalStatus::PendingManager);
        assert!(can_view(&user(OWNER, Role::Employee), &c));
        assert!(can_view(&user(MANAGER, Role::Manager), &c));
        assert!(can_view(&user(300, Role::Hr), &c));
        assert!(!can_view(&user(400, Role::Employee), &c));
        assert!(!can_view(&user(401, Role::Manager), &c));
    }

    #[test]
    fn status_parses_from_column_text() {
        assert_eq!(
            ApprovalStatus::try_from("PENDING_HR".to_string()).unwrap(),
            ApprovalStatus::PendingHr
        );
        assert!(ApprovalStatus::try_from("pending".to_string()).is_err());
    }
}
