use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{AppError, AppResult};

pub const MAX_OVERTIME_MINUTES: i64 = 16 * 60;

/// Hours between `start` and `end`, rounded to two decimals.
pub fn overtime_hours(start: NaiveDateTime, end: NaiveDateTime) -> AppResult<Decimal> {
    if end <= start {
        return Err(AppError::validation("end_at must be after start_at"));
    }
    let minutes = (end - start).num_minutes();
    if minutes > MAX_OVERTIME_MINUTES {
        return Err(AppError::validation("Overtime cannot exceed 16 hours in one request"));
    }
    if minutes == 0 {
        return Err(AppError::validation("Overtime must be at least one minute"));
    }

    Ok((Decimal::from(minutes) / Decimal::from(60))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 2, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn hours_rounded_to_cents() {
        assert_eq!(overtime_hours(at(17, 0), at(19, 30)).unwrap(), Decimal::from_str("2.5").unwrap());
        assert_eq!(overtime_hours(at(17, 0), at(17, 20)).unwrap(), Decimal::from_str("0.33").unwrap());
    }

    #[test]
    fn inverted_range_rejected() {
        assert!(overtime_hours(at(19, 0), at(17, 0)).is_err());
        assert!(overtime_hours(at(19, 0), at(19, 0)).is_err());
    }

    #[test]
    fn sixteen_hour_cap() {
        assert!(overtime_hours(at(0, 0), at(16, 0)).is_ok());
        assert!(overtime_hours(at(0, 0), at(16, 1)).is_err());
    }
}
