use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveType {
    Annual,
    Sick,
    Emergency,
    Unpaid,
}

impl TryFrom<String> for LeaveType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl LeaveType {
    /// Unpaid leave is not drawn from an allotment.
    pub fn is_balance_tracked(self) -> bool {
        !matches!(self, LeaveType::Unpaid)
    }
}

/// Monday–Friday days in `start..=end`.
pub fn working_days(start: NaiveDate, end: NaiveDate) -> u32 {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as u32
}

pub fn validate_range(start: NaiveDate, end: NaiveDate) -> AppResult<u32> {
    if start > end {
        return Err(AppError::validation("start_date cannot be after end_date"));
    }
    if start.year() != end.year() {
        return Err(AppError::validation(
            "A leave request cannot span two calendar years; file one per year",
        ));
    }
    let days = working_days(start, end);
    if days == 0 {
        return Err(AppError::validation("The requested range contains no working days"));
    }
    Ok(days)
}

/// Whether `days` more can be taken given the allotment, what is already
/// used, and what is still waiting for approval.
pub fn check_balance(requested: u32, allotted: u32, used: u32, pending: u32) -> AppResult<()> {
    let available = allotted.saturating_sub(used).saturating_sub(pending);
    if requested > available {
        return Err(AppError::validation(format!(
            "Insufficient leave balance: requested {requested} day(s), {available} available"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_are_not_counted() {
        // Fri 2026-01-02 .. Mon 2026-01-05
        assert_eq!(working_days(d(2026, 1, 2), d(2026, 1, 5)), 2);
        assert_eq!(working_days(d(2026, 1, 5), d(2026, 1, 9)), 5);
        assert_eq!(working_days(d(2026, 1, 5), d(2026, 1, 5)), 1);
    }

    #[test]
    fn weekend_only_range_is_rejected() {
        let err = validate_range(d(2026, 1, 3), d(2026, 1, 4)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn reversed_and_cross_year_ranges_are_rejected() {
        assert!(validate_range(d(2026, 1, 9), d(2026, 1, 5)).is_err());
        assert!(validate_range(d(2025, 12, 29), d(2026, 1, 2)).is_err());
    }

    #[test]
    fn balance_counts_pending_requests() {
        assert!(check_balance(3, 15, 10, 2).is_ok());
        assert!(check_balance(4, 15, 10, 2).is_err());
        assert!(check_balance(1, 0, 0, 0).is_err());
    }

    #[test]
    fn unpaid_is_untracked() {
        assert!(!LeaveType::Unpaid.is_balance_tracked());
        assert!(LeaveType::Annual.is_balance_tracked());
    }
}
