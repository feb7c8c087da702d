//! Monthly depreciation of a single asset.
//!
//! Amounts are rounded to cents. The book value never drops below the
//! salvage value, and the last period of the useful life books whatever is
//! left, so every method lands exactly on salvage.

use chrono::{Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::domain::calendar::{first_day_of_month, last_day_of_month, months_between};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DepreciationMethod {
    StraightLine,
    /// 150% declining balance
    DecliningBalance,
    DoubleDecliningBalance,
    SumOfYearsDigits,
}

impl TryFrom<String> for DepreciationMethod {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone)]
pub struct DepreciationBasis {
    pub method: DepreciationMethod,
    pub cost: Decimal,
    pub salvage: Decimal,
    pub useful_life_months: u32,
    pub start_date: NaiveDate,
    pub book_value: Decimal,
    /// Period (month-end date) of the last booked entry
    pub last_period: Option<NaiveDate>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    NotStarted,
    AlreadyDepreciated,
    FullyDepreciated,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ScheduleLine {
    #[schema(value_type = String, format = "date")]
    pub period: NaiveDate,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub book_value_after: Decimal,
}

fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn rate_factor(method: DepreciationMethod) -> Option<Decimal> {
    match method {
        DepreciationMethod::DecliningBalance => Some(Decimal::new(15, 1)),
        DepreciationMethod::DoubleDecliningBalance => Some(Decimal::TWO),
        _ => None,
    }
}

/// Raw (uncapped) amount for the period with zero-based index `index`
/// counted from the start month.
fn raw_amount(basis: &DepreciationBasis, index: u32) -> Decimal {
    let life = Decimal::from(basis.useful_life_months);
    let base = basis.cost - basis.salvage;

    match basis.method {
        DepreciationMethod::StraightLine => cents(base / life),
        DepreciationMethod::DecliningBalance | DepreciationMethod::DoubleDecliningBalance => {
            let factor = rate_factor(basis.method).unwrap_or(Decimal::ONE);
            cents(basis.book_value * factor / life)
        }
        DepreciationMethod::SumOfYearsDigits => {
            let life = u64::from(basis.useful_life_months);
            let years = life.div_ceil(12);
            let remaining_years = years.saturating_sub(u64::from(index) / 12);
            cents(base * Decimal::from(remaining_years) / Decimal::from(syd_month_weights(life)))
        }
    }
}

/// Sum of year digits weighted by the months each year lasts, so a short
/// final year carries only its own months.
fn syd_month_weights(life_months: u64) -> u64 {
    let full_years = life_months / 12;
    let partial = life_months % 12;
    if partial == 0 {
        12 * full_years * (full_years + 1) / 2
    } else {
        // Full years carry digits 2..=full_years + 1, the partial year carries 1.
        12 * ((full_years + 1) * (full_years + 2) / 2 - 1) + partial
    }
}

/// Amount to book for the month containing `period`, or why nothing is due.
pub fn amount_for_period(
    basis: &DepreciationBasis,
    period: NaiveDate,
) -> Result<Decimal, SkipReason> {
    let period_end = last_day_of_month(period);

    if basis.start_date > period_end {
        return Err(SkipReason::NotStarted);
    }
    if basis
        .last_period
        .is_some_and(|last| last_day_of_month(last) >= period_end)
    {
        return Err(SkipReason::AlreadyDepreciated);
    }

    let depreciable = basis.book_value - basis.salvage;
    if depreciable <= Decimal::ZERO || basis.useful_life_months == 0 {
        return Err(SkipReason::FullyDepreciated);
    }

    let index = u32::try_from(months_between(basis.start_date, period_end).max(0)).unwrap_or(u32::MAX);
    let amount = if index.saturating_add(1) >= basis.useful_life_months {
        depreciable
    } else {
        raw_amount(basis, index).min(depreciable)
    };

    if amount <= Decimal::ZERO {
        return Err(SkipReason::FullyDepreciated);
    }
    Ok(amount)
}

/// Projects every remaining period from the asset's current state.
pub fn schedule(basis: &DepreciationBasis) -> Vec<ScheduleLine> {
    let mut state = basis.clone();
    let mut lines = Vec::new();

    let mut period = match basis.last_period {
        Some(last) => first_day_of_month(last).checked_add_months(Months::new(1)),
        None => Some(first_day_of_month(basis.start_date)),
    };

    // The last period of the useful life always clears the remainder, so the
    // loop is bounded by the useful life; the guard covers catch-up after it.
    let max_periods = basis.useful_life_months as usize + 1;
    while let Some(current) = period {
        if lines.len() >= max_periods {
            break;
        }
        match amount_for_period(&state, current) {
            Ok(amount) => {
                let period_end = last_day_of_month(current);
                state.book_value -= amount;
                state.last_period = Some(period_end);
                lines.push(ScheduleLine {
                    period: period_end,
                    amount,
                    book_value_after: state.book_value,
                });
            }
            Err(SkipReason::FullyDepreciated) => break,
            Err(_) => {}
        }
        period = current.checked_add_months(Months::new(1));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn basis(method: DepreciationMethod) -> DepreciationBasis {
        DepreciationBasis {
            method,
            cost: dec("12000.00"),
            salvage: dec("1200.00"),
            useful_life_months: 36,
            start_date: d(2026, 1, 15),
            book_value: dec("12000.00"),
            last_period: None,
        }
    }

    #[test]
    fn straight_line_is_flat() {
        let b = basis(DepreciationMethod::StraightLine);
        assert_eq!(amount_for_period(&b, d(2026, 1, 31)), Ok(dec("300.00")));
        assert_eq!(amount_for_period(&b, d(2026, 6, 30)), Ok(dec("300.00")));
    }

    #[test]
    fn nothing_before_start_month() {
        let b = basis(DepreciationMethod::StraightLine);
        assert_eq!(amount_for_period(&b, d(2025, 12, 31)), Err(SkipReason::NotStarted));
    }

    #[test]
    fn same_period_is_not_booked_twice() {
        let mut b = basis(DepreciationMethod::StraightLine);
        b.last_period = Some(d(2026, 3, 31));
        assert_eq!(
            amount_for_period(&b, d(2026, 3, 30)),
            Err(SkipReason::AlreadyDepreciated)
        );
        assert!(amount_for_period(&b, d(2026, 4, 30)).is_ok());
    }

    #[test]
    fn never_below_salvage() {
        let mut b = basis(DepreciationMethod::StraightLine);
        b.book_value = dec("1350.00");
        assert_eq!(amount_for_period(&b, d(2026, 2, 28)), Ok(dec("150.00")));

        b.book_value = dec("1200.00");
        assert_eq!(
            amount_for_period(&b, d(2026, 3, 31)),
            Err(SkipReason::FullyDepreciated)
        );
    }

    #[test]
    fn double_declining_uses_book_value() {
        let mut b = basis(DepreciationMethod::DoubleDecliningBalance);
        // 12000 * 2 / 36
        assert_eq!(amount_for_period(&b, d(2026, 1, 31)), Ok(dec("666.67")));
        b.book_value = dec("6000.00");
        assert_eq!(amount_for_period(&b, d(2026, 1, 31)), Ok(dec("333.33")));
    }

    #[test]
    fn declining_balance_uses_one_and_a_half() {
        let b = basis(DepreciationMethod::DecliningBalance);
        // 12000 * 1.5 / 36
        assert_eq!(amount_for_period(&b, d(2026, 1, 31)), Ok(dec("500.00")));
    }

    #[test]
    fn sum_of_years_digits_steps_down_yearly() {
        let b = basis(DepreciationMethod::SumOfYearsDigits);
        // 10800 * 3/6 / 12 = 450, then 10800 * 2/6 / 12 = 300
        assert_eq!(amount_for_period(&b, d(2026, 1, 31)), Ok(dec("450.00")));
        assert_eq!(amount_for_period(&b, d(2027, 1, 31)), Ok(dec("300.00")));
        assert_eq!(amount_for_period(&b, d(2028, 1, 31)), Ok(dec("150.00")));
    }

    #[test]
    fn sum_of_years_digits_prorates_a_short_final_year() {
        let mut b = basis(DepreciationMethod::SumOfYearsDigits);
        b.cost = dec("3600.00");
        b.salvage = Decimal::ZERO;
        b.book_value = dec("3600.00");
        b.useful_life_months = 18;

        let lines = schedule(&b);
        assert_eq!(lines.len(), 18);
        // Weights 2 x 12 months + 1 x 6 months = 30
        assert!(lines[..12].iter().all(|l| l.amount == dec("240.00")));
        assert!(lines[12..].iter().all(|l| l.amount == dec("120.00")));
        assert_eq!(lines.last().unwrap().book_value_after, Decimal::ZERO);
    }

    #[test]
    fn long_sum_of_years_digits_life_does_not_overflow() {
        let mut b = basis(DepreciationMethod::SumOfYearsDigits);
        b.useful_life_months = u32::MAX;
        let result = amount_for_period(&b, d(2026, 1, 31));
        assert!(result.map_or(true, |amount| amount <= dec("10800.00")));
    }

    #[test]
    fn every_method_schedule_ends_on_salvage() {
        for method in [
            DepreciationMethod::StraightLine,
            DepreciationMethod::DecliningBalance,
            DepreciationMethod::DoubleDecliningBalance,
            DepreciationMethod::SumOfYearsDigits,
        ] {
            let lines = schedule(&basis(method));
            assert_eq!(lines.len(), 36, "{method:?}");
            let last = lines.last().unwrap();
            assert_eq!(last.book_value_after, dec("1200.00"), "{method:?}");
            assert_eq!(last.period, d(2028, 12, 31));

            let total: Decimal = lines.iter().map(|l| l.amount).sum();
            assert_eq!(total, dec("10800.00"), "{method:?}");
        }
    }

    #[test]
    fn schedule_resumes_after_last_period() {
        let mut b = basis(DepreciationMethod::StraightLine);
        b.book_value = dec("9000.00");
        b.last_period = Some(d(2026, 10, 31));

        let lines = schedule(&b);
        assert_eq!(lines[0].period, d(2026, 11, 30));
        assert_eq!(lines.len(), 26);
        assert_eq!(lines.last().unwrap().book_value_after, dec("1200.00"));
    }

    #[test]
    fn overdue_asset_books_remainder_in_one_go() {
        let mut b = basis(DepreciationMethod::StraightLine);
        b.book_value = dec("5000.00");
        assert_eq!(amount_for_period(&b, d(2030, 5, 31)), Ok(dec("3800.00")));
    }

    #[test]
    fn method_parses_column_text() {
        assert_eq!(
            DepreciationMethod::try_from("SUM_OF_YEARS_DIGITS".to_string()).unwrap(),
            DepreciationMethod::SumOfYearsDigits
        );
    }
}
