//! Material request (MRS) lifecycle.
//!
//! ```text
//! DRAFT → FOR_REC_APPROVAL → FOR_FINAL_APPROVAL → FOR_SERVING → FOR_POSTING → DONE
//!   │            │  │                 │
//!   └─cancel─────┘  └──────reject─────┴──▶ REJECTED
//! ```
//!
//! A request flagged for edit is frozen until the requester fixes the item
//! descriptions.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::permission::Permission;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MaterialStatus {
    Draft,
    ForRecApproval,
    ForFinalApproval,
    ForServing,
    ForPosting,
    Done,
    Rejected,
    Cancelled,
}

impl TryFrom<String> for MaterialStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl MaterialStatus {
    /// States in which a request may be flagged for edit.
    pub fn editable_by_flag(self) -> bool {
        matches!(
            self,
            MaterialStatus::ForRecApproval
                | MaterialStatus::ForFinalApproval
                | MaterialStatus::ForServing
        )
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MaterialAction {
    UpdateDraft,
    Submit,
    Cancel,
    RecApprove,
    FinalApprove,
    Reject,
    MarkForEdit,
    CompleteEdit,
    Acknowledge,
    Serve,
    Post,
}

#[derive(Debug, Clone)]
pub struct MaterialContext {
    pub business_unit_id: u64,
    pub owner_id: u64,
    pub rec_approver_id: u64,
    pub final_approver_id: u64,
    pub status: MaterialStatus,
    pub is_marked_for_edit: bool,
    pub acknowledged: bool,
}

impl MaterialContext {
    /// Approver responsible for the current approval stage, if any.
    fn stage_approver(&self) -> Option<u64> {
        match self.status {
            MaterialStatus::ForRecApproval => Some(self.rec_approver_id),
            MaterialStatus::ForFinalApproval => Some(self.final_approver_id),
            _ => None,
        }
    }
}

fn wrong_state(action: MaterialAction, status: MaterialStatus) -> AppError {
    AppError::conflict(format!(
        "Cannot {action:?} a material request that is {}",
        status.as_ref()
    ))
}

fn require_owner(actor: &AuthUser, ctx: &MaterialContext) -> AppResult<()> {
    if actor.user_id == ctx.owner_id {
        Ok(())
    } else {
        Err(AppError::forbidden("Only the requester can do this"))
    }
}

fn require_coordinator(actor: &AuthUser) -> AppResult<()> {
    actor.require(Permission::CoordinateMaterialRequests)
}

/// Checks `action` against the current state and the actor, returning the
/// status the request ends in. `Serve` returns `FOR_SERVING`; moving on to
/// `FOR_POSTING` is decided by [`apply_serving`].
pub fn authorize(
    actor: &AuthUser,
    ctx: &MaterialContext,
    action: MaterialAction,
) -> AppResult<MaterialStatus> {
    use MaterialAction as A;
    use MaterialStatus as S;

    if actor.business_unit_id != ctx.business_unit_id {
        return Err(AppError::forbidden(
            "Material request belongs to another business unit",
        ));
    }

    if ctx.is_marked_for_edit && action != A::CompleteEdit {
        return Err(AppError::conflict(
            "Material request is marked for edit and waits for the requester",
        ));
    }

    match (action, ctx.status) {
        (A::UpdateDraft, S::Draft) => {
            require_owner(actor, ctx)?;
            Ok(S::Draft)
        }
        (A::Submit, S::Draft) => {
            require_owner(actor, ctx)?;
            Ok(S::ForRecApproval)
        }
        (A::Cancel, S::Draft | S::ForRecApproval) => {
            require_owner(actor, ctx)?;
            Ok(S::Cancelled)
        }
        (A::RecApprove, S::ForRecApproval) => {
            if actor.user_id != ctx.rec_approver_id {
                return Err(AppError::forbidden("You are not the recommending approver"));
            }
            Ok(S::ForFinalApproval)
        }
        (A::FinalApprove, S::ForFinalApproval) => {
            if actor.user_id != ctx.final_approver_id {
                return Err(AppError::forbidden("You are not the final approver"));
            }
            Ok(S::ForServing)
        }
        (A::Reject, S::ForRecApproval | S::ForFinalApproval) => {
            if ctx.stage_approver() != Some(actor.user_id) {
                return Err(AppError::forbidden(
                    "Only the approver of the current stage can reject",
                ));
            }
            Ok(S::Rejected)
        }
        (A::MarkForEdit, status) if status.editable_by_flag() => {
            let allowed = match status {
                S::ForServing => actor.can(Permission::CoordinateMaterialRequests),
                _ => ctx.stage_approver() == Some(actor.user_id),
            };
            if !allowed {
                return Err(AppError::forbidden(
                    "Only the current approver or an MRS coordinator can mark for edit",
                ));
            }
            Ok(status)
        }
        (A::CompleteEdit, status) => {
            require_owner(actor, ctx)?;
            if !ctx.is_marked_for_edit {
                return Err(AppError::conflict("Material request is not marked for edit"));
            }
            Ok(status)
        }
        (A::Acknowledge, S::ForServing) => {
            require_coordinator(actor)?;
            if ctx.acknowledged {
                return Err(AppError::conflict("Material request already acknowledged"));
            }
            Ok(S::ForServing)
        }
        (A::Serve, S::ForServing) => {
            require_coordinator(actor)?;
            if !ctx.acknowledged {
                return Err(AppError::conflict(
                    "Material request must be acknowledged before serving",
                ));
            }
            Ok(S::ForServing)
        }
        (A::Post, S::ForPosting) => {
            require_coordinator(actor)?;
            Ok(S::Done)
        }
        (action, status) => Err(wrong_state(action, status)),
    }
}

/// Served state of one line item.
#[derive(Debug, Clone, PartialEq)]
pub struct LineState {
    pub item_id: u64,
    pub quantity: Decimal,
    pub quantity_served: Decimal,
}

impl LineState {
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.quantity_served
    }

    pub fn is_fully_served(&self) -> bool {
        self.quantity_served >= self.quantity
    }
}

/// Adds `serves` (item id, quantity) to `lines`. Fails without touching
/// anything when a quantity is not positive, names an unknown item, or
/// would push a line past its requested quantity. Returns whether every
/// line is now fully served.
pub fn apply_serving(lines: &mut [LineState], serves: &[(u64, Decimal)]) -> AppResult<bool> {
    if serves.is_empty() {
        return Err(AppError::validation("Nothing to serve"));
    }

    let mut updated = lines.to_vec();
    for (item_id, qty) in serves {
        if *qty <= Decimal::ZERO {
            return Err(AppError::validation(format!(
                "Serve quantity for item {item_id} must be greater than zero"
            )));
        }
        let line = updated
            .iter_mut()
            .find(|l| l.item_id == *item_id)
            .ok_or_else(|| AppError::validation(format!("Item {item_id} is not on this request")))?;

        if *qty > line.remaining() {
            return Err(AppError::validation(format!(
                "Item {item_id}: serving {qty} exceeds remaining quantity {}",
                line.remaining()
            )));
        }
        line.quantity_served += *qty;
    }

    lines.clone_from_slice(&updated);
    Ok(lines.iter().all(LineState::is_fully_served))
}

/// Requester, both approvers and coordinators see a request.
pub fn can_view(actor: &AuthUser, ctx: &MaterialContext) -> bool {
    actor.business_unit_id == ctx.business_unit_id
        && (actor.user_id == ctx.owner_id
            || actor.user_id == ctx.rec_approver_id
            || actor.user_id == ctx.final_approver_id
            || actor.can(Permission::CoordinateMaterialRequests))
}

pub fn check_approvers(requester_id: u64, rec_approver_id: u64, final_approver_id: u64) -> AppResult<()> {
    if rec_approver_id == final_approver_id {
        return Err(AppError::validation(
            "Recommending and final approver must be different users",
        ));
    }
    if requester_id == rec_approver_id || requester_id == final_approver_id {
        return Err(AppError::validation("You cannot approve your own request"));
    }
    Ok(())
}

/// Largest quantity a DECIMAL(12,2) column holds.
fn max_quantity() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

pub fn validate_line(item_code: &str, description: &str, uom: &str, quantity: Decimal) -> AppResult<()> {
    if item_code.trim().is_empty() || description.trim().is_empty() || uom.trim().is_empty() {
        return Err(AppError::validation(
            "Each item needs an item_code, description and uom",
        ));
    }
    if quantity <= Decimal::ZERO {
        return Err(AppError::validation(format!(
            "Quantity for {} must be greater than zero",
            item_code.trim()
        )));
    }
    if quantity.scale() > 2 {
        return Err(AppError::validation("Quantities are limited to two decimal places"));
    }
    if quantity > max_quantity() {
        return Err(AppError::validation(format!(
            "Quantity for {} is too large",
            item_code.trim()
        )));
    }
    Ok(())
}

/// Next sequence after the highest reference issued this month.
pub fn next_sequence(last_reference: Option<&str>) -> u32 {
    last_reference
        .and_then(|r| r.rsplit('-').next())
        .and_then(|n| n.parse::<u32>().ok())
        .map_or(1, |n| n + 1)
}

/// `MRS-YYYYMM-NNNN`, numbered per business unit and month.
pub fn format_reference(date: NaiveDate, sequence: u32) -> String {
    format!("MRS-{}-{sequence:04}", date.format("%Y%m"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use std::str::FromStr;

    const OWNER: u64 = 10;
    const REC: u64 = 20;
    const FINAL: u64 = 30;
    const COORD: u64 = 40;

    fn actor(user_id: u64, role: Role) -> AuthUser {
        AuthUser {
            user_id,
            username: format!("u{user_id}"),
            role,
            business_unit_id: 1,
        }
    }

    fn ctx(status: MaterialStatus) -> MaterialContext {
        MaterialContext {
            business_unit_id: 1,
            owner_id: OWNER,
            rec_approver_id: REC,
            final_approver_id: FINAL,
            status,
            is_marked_for_edit: false,
            acknowledged: false,
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn happy_path_through_approvals() {
        use MaterialAction as A;
        use MaterialStatus as S;

        let owner = actor(OWNER, Role::Employee);
        assert_eq!(authorize(&owner, &ctx(S::Draft), A::Submit).unwrap(), S::ForRecApproval);

        let rec = actor(REC, Role::Manager);
        assert_eq!(
            authorize(&rec, &ctx(S::ForRecApproval), A::RecApprove).unwrap(),
            S::ForFinalApproval
        );

        let fin = actor(FINAL, Role::Employee);
        assert_eq!(
            authorize(&fin, &ctx(S::ForFinalApproval), A::FinalApprove).unwrap(),
            S::ForServing
        );
    }

    #[test]
    fn final_approver_cannot_act_at_recommending_stage() {
        let fin = actor(FINAL, Role::Employee);
        let err = authorize(&fin, &ctx(MaterialStatus::ForRecApproval), MaterialAction::RecApprove)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn reject_only_by_current_stage_approver() {
        let rec = actor(REC, Role::Manager);
        let fin = actor(FINAL, Role::Manager);
        let c = ctx(MaterialStatus::ForFinalApproval);

        assert!(authorize(&rec, &c, MaterialAction::Reject).is_err());
        assert_eq!(
            authorize(&fin, &c, MaterialAction::Reject).unwrap(),
            MaterialStatus::Rejected
        );
    }

    #[test]
    fn marked_for_edit_suspends_progress() {
        let mut c = ctx(MaterialStatus::ForRecApproval);
        c.is_marked_for_edit = true;

        let rec = actor(REC, Role::Manager);
        assert!(matches!(
            authorize(&rec, &c, MaterialAction::RecApprove),
            Err(AppError::Conflict(_))
        ));

        let owner = actor(OWNER, Role::Employee);
        assert!(matches!(
            authorize(&owner, &c, MaterialAction::Cancel),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(
            authorize(&owner, &c, MaterialAction::CompleteEdit).unwrap(),
            MaterialStatus::ForRecApproval
        );
    }

    #[test]
    fn complete_edit_requires_flag() {
        let owner = actor(OWNER, Role::Employee);
        let err = authorize(&owner, &ctx(MaterialStatus::ForServing), MaterialAction::CompleteEdit)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn coordinator_marks_for_edit_while_serving() {
        let coord = actor(COORD, Role::MrsCoordinator);
        let c = ctx(MaterialStatus::ForServing);
        assert_eq!(
            authorize(&coord, &c, MaterialAction::MarkForEdit).unwrap(),
            MaterialStatus::ForServing
        );

        let rec = actor(REC, Role::Manager);
        assert!(authorize(&rec, &c, MaterialAction::MarkForEdit).is_err());
    }

    #[test]
    fn cannot_mark_draft_or_done_for_edit() {
        let admin = actor(1, Role::Admin);
        for status in [MaterialStatus::Draft, MaterialStatus::ForPosting, MaterialStatus::Done] {
            assert!(matches!(
                authorize(&admin, &ctx(status), MaterialAction::MarkForEdit),
                Err(AppError::Conflict(_))
            ));
        }
    }

    #[test]
    fn serving_requires_acknowledgement() {
        let coord = actor(COORD, Role::MrsCoordinator);
        let mut c = ctx(MaterialStatus::ForServing);
        assert!(matches!(
            authorize(&coord, &c, MaterialAction::Serve),
            Err(AppError::Conflict(_))
        ));

        authorize(&coord, &c, MaterialAction::Acknowledge).unwrap();
        c.acknowledged = true;
        assert!(authorize(&coord, &c, MaterialAction::Acknowledge).is_err());
        assert_eq!(
            authorize(&coord, &c, MaterialAction::Serve).unwrap(),
            MaterialStatus::ForServing
        );
    }

    #[test]
    fn employees_cannot_serve_or_post() {
        let emp = actor(99, Role::Employee);
        let mut c = ctx(MaterialStatus::ForServing);
        c.acknowledged = true;
        assert!(matches!(
            authorize(&emp, &c, MaterialAction::Serve),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(&emp, &ctx(MaterialStatus::ForPosting), MaterialAction::Post),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn post_finishes_request() {
        let coord = actor(COORD, Role::MrsCoordinator);
        assert_eq!(
            authorize(&coord, &ctx(MaterialStatus::ForPosting), MaterialAction::Post).unwrap(),
            MaterialStatus::Done
        );
    }

    #[test]
    fn cancel_not_allowed_after_recommending_approval() {
        let owner = actor(OWNER, Role::Employee);
        assert!(authorize(&owner, &ctx(MaterialStatus::ForFinalApproval), MaterialAction::Cancel).is_err());
    }

    #[test]
    fn partial_serving_then_completion() {
        let mut lines = vec![
            LineState { item_id: 1, quantity: dec("10"), quantity_served: dec("0") },
            LineState { item_id: 2, quantity: dec("2.5"), quantity_served: dec("0") },
        ];

        let done = apply_serving(&mut lines, &[(1, dec("4"))]).unwrap();
        assert!(!done);
        assert_eq!(lines[0].quantity_served, dec("4"));

        let done = apply_serving(&mut lines, &[(1, dec("6")), (2, dec("2.5"))]).unwrap();
        assert!(done);
    }

    #[test]
    fn over_serving_leaves_lines_untouched() {
        let mut lines = vec![
            LineState { item_id: 1, quantity: dec("10"), quantity_served: dec("8") },
            LineState { item_id: 2, quantity: dec("5"), quantity_served: dec("0") },
        ];
        let before = lines.clone();

        let err = apply_serving(&mut lines, &[(2, dec("1")), (1, dec("3"))]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(lines, before);
    }

    #[test]
    fn huge_serve_quantity_is_rejected_without_overflow() {
        let mut lines = vec![LineState { item_id: 1, quantity: dec("10"), quantity_served: dec("5") }];
        let err = apply_serving(&mut lines, &[(1, Decimal::MAX)]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(lines[0].quantity_served, dec("5"));
    }

    #[test]
    fn serving_rejects_zero_and_unknown_items() {
        let mut lines = vec![LineState { item_id: 1, quantity: dec("1"), quantity_served: dec("0") }];
        assert!(apply_serving(&mut lines, &[(1, dec("0"))]).is_err());
        assert!(apply_serving(&mut lines, &[(7, dec("1"))]).is_err());
        assert!(apply_serving(&mut lines, &[]).is_err());
    }

    #[test]
    fn visibility_follows_participants() {
        let c = ctx(MaterialStatus::ForFinalApproval);
        assert!(can_view(&actor(OWNER, Role::Employee), &c));
        assert!(can_view(&actor(REC, Role::Employee), &c));
        assert!(can_view(&actor(COORD, Role::MrsCoordinator), &c));
        assert!(!can_view(&actor(77, Role::Manager), &c));

        let mut other_unit = actor(COORD, Role::MrsCoordinator);
        other_unit.business_unit_id = 2;
        assert!(!can_view(&other_unit, &c));
    }

    #[test]
    fn approver_selection() {
        assert!(check_approvers(OWNER, REC, FINAL).is_ok());
        assert!(check_approvers(OWNER, REC, REC).is_err());
        assert!(check_approvers(OWNER, OWNER, FINAL).is_err());
    }

    #[test]
    fn line_validation() {
        assert!(validate_line("CEM", "Cement", "BAG", dec("2")).is_ok());
        assert!(validate_line(" ", "Cement", "BAG", dec("2")).is_err());
        assert!(validate_line("CEM", "Cement", "BAG", dec("0")).is_err());
        assert!(validate_line("CEM", "Cement", "BAG", dec("1.005")).is_err());
        assert!(validate_line("CEM", "Cement", "BAG", dec("9999999999.99")).is_ok());
        assert!(validate_line("CEM", "Cement", "BAG", dec("10000000000")).is_err());
    }

    #[test]
    fn sequence_continues_from_last_reference() {
        assert_eq!(next_sequence(None), 1);
        assert_eq!(next_sequence(Some("MRS-202603-0007")), 8);
    }

    #[test]
    fn reference_format() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(format_reference(d, 7), "MRS-202603-0007");
    }
}
