use chrono::{Datelike, Months, NaiveDate};

use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::permission::Permission;

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    first_day_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

/// Whole calendar months from the month of `from` to the month of `to`.
/// Negative when `to` lies in an earlier month.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}

/// Depreciation runs happen at month end: the 30th, the 31st, or the last
/// day of a month that has fewer than 30 days.
pub fn is_depreciation_day(date: NaiveDate) -> bool {
    date.day() >= 30 || date == last_day_of_month(date)
}

/// Gate for a depreciation run on `today`. Outside the window only an
/// explicit admin override lets the run through.
pub fn check_depreciation_window(
    actor: &AuthUser,
    today: NaiveDate,
    override_requested: bool,
) -> AppResult<()> {
    if override_requested {
        if !actor.can(Permission::OverrideDepreciationCalendar) {
            return Err(AppError::forbidden(
                "Only administrators can override the depreciation calendar",
            ));
        }
        if !is_depreciation_day(today) {
            tracing::warn!(
                user_id = actor.user_id,
                %today,
                "Depreciation calendar overridden"
            );
        }
        return Ok(());
    }

    if is_depreciation_day(today) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Depreciation can only run on the 30th/31st or the last day of the month (today is {today})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn actor(role: Role) -> AuthUser {
        AuthUser {
            user_id: 5,
            username: "acct".into(),
            role,
            business_unit_id: 1,
        }
    }

    #[test]
    fn month_end_days() {
        assert!(is_depreciation_day(d(2026, 1, 30)));
        assert!(is_depreciation_day(d(2026, 1, 31)));
        assert!(is_depreciation_day(d(2026, 4, 30)));
        assert!(!is_depreciation_day(d(2026, 4, 29)));
        assert!(!is_depreciation_day(d(2026, 1, 15)));
    }

    #[test]
    fn february_uses_last_day() {
        assert!(is_depreciation_day(d(2026, 2, 28)));
        assert!(!is_depreciation_day(d(2026, 2, 27)));
        assert!(is_depreciation_day(d(2028, 2, 29)));
        assert!(!is_depreciation_day(d(2028, 2, 28)));
    }

    #[test]
    fn last_day_handles_december() {
        assert_eq!(last_day_of_month(d(2026, 12, 3)), d(2026, 12, 31));
        assert_eq!(last_day_of_month(d(2026, 2, 3)), d(2026, 2, 28));
    }

    #[test]
    fn months_between_crosses_years() {
        assert_eq!(months_between(d(2025, 11, 15), d(2026, 2, 1)), 3);
        assert_eq!(months_between(d(2026, 2, 1), d(2026, 2, 28)), 0);
        assert_eq!(months_between(d(2026, 3, 1), d(2026, 2, 28)), -1);
    }

    #[test]
    fn window_closed_mid_month_without_override() {
        let err = check_depreciation_window(&actor(Role::Accounting), d(2026, 5, 12), false)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn admin_override_opens_window() {
        assert!(check_depreciation_window(&actor(Role::Admin), d(2026, 5, 12), true).is_ok());
    }

    #[test]
    fn non_admin_override_is_forbidden_even_at_month_end() {
        let err = check_depreciation_window(&actor(Role::AssetManager), d(2026, 5, 31), true)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn window_open_at_month_end() {
        assert!(check_depreciation_window(&actor(Role::AssetManager), d(2026, 5, 31), false).is_ok());
    }
}
