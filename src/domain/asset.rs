use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Available,
    Deployed,
    Retired,
    Disposed,
}

impl TryFrom<String> for AssetStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl AssetStatus {
    /// Assets still in service keep depreciating.
    pub fn in_service(self) -> bool {
        matches!(self, AssetStatus::Available | AssetStatus::Deployed)
    }
}

pub fn check_deploy(status: AssetStatus) -> AppResult<AssetStatus> {
    match status {
        AssetStatus::Available => Ok(AssetStatus::Deployed),
        other => Err(AppError::conflict(format!(
            "Asset is {}, only AVAILABLE assets can be deployed",
            other.as_ref()
        ))),
    }
}

pub fn check_return(status: AssetStatus) -> AppResult<AssetStatus> {
    match status {
        AssetStatus::Deployed => Ok(AssetStatus::Available),
        other => Err(AppError::conflict(format!(
            "Asset is {}, only DEPLOYED assets can be returned",
            other.as_ref()
        ))),
    }
}

/// Outcome of retiring one asset.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Retirement {
    /// The open deployment has to be closed first
    pub auto_return: bool,
}

pub fn check_retire(code: &str, status: AssetStatus) -> AppResult<Retirement> {
    match status {
        AssetStatus::Available => Ok(Retirement { auto_return: false }),
        AssetStatus::Deployed => Ok(Retirement { auto_return: true }),
        other => Err(AppError::conflict(format!(
            "Asset {code} is already {}",
            other.as_ref()
        ))),
    }
}

pub fn check_dispose(status: AssetStatus) -> AppResult<AssetStatus> {
    match status {
        AssetStatus::Retired => Ok(AssetStatus::Disposed),
        other => Err(AppError::conflict(format!(
            "Asset is {}, only RETIRED assets can be disposed",
            other.as_ref()
        ))),
    }
}

pub fn validate_disposal_date(disposal_date: Option<NaiveDate>, today: NaiveDate) -> AppResult<()> {
    match disposal_date {
        Some(date) if date < today => Err(AppError::validation(format!(
            "Disposal date {date} is in the past"
        ))),
        _ => Ok(()),
    }
}

/// A century of monthly periods.
pub const MAX_USEFUL_LIFE_MONTHS: u32 = 1200;

/// Largest amount a DECIMAL(15,2) column holds.
fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999, 2)
}

/// Cost figures supplied when registering an asset.
pub fn validate_costing(
    purchase_price: Decimal,
    salvage_value: Decimal,
    useful_life_months: u32,
) -> AppResult<()> {
    if purchase_price <= Decimal::ZERO {
        return Err(AppError::validation("purchase_price must be greater than zero"));
    }
    if salvage_value < Decimal::ZERO || salvage_value >= purchase_price {
        return Err(AppError::validation(
            "salvage_value must be at least zero and below purchase_price",
        ));
    }
    if useful_life_months == 0 || useful_life_months > MAX_USEFUL_LIFE_MONTHS {
        return Err(AppError::validation(format!(
            "useful_life_months must be between 1 and {MAX_USEFUL_LIFE_MONTHS}"
        )));
    }
    if purchase_price > max_amount() {
        return Err(AppError::validation("purchase_price is too large"));
    }
    if purchase_price.scale() > 2 || salvage_value.scale() > 2 {
        return Err(AppError::validation("Amounts are limited to two decimal places"));
    }
    Ok(())
}

/// Payload a scanner resolves to this asset.
pub fn qr_payload(public_base_url: &str, api_prefix: &str, qr_token: &str) -> String {
    format!("{public_base_url}{api_prefix}/assets/qr/{qr_token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn deploy_and_return_cycle() {
        assert_eq!(check_deploy(AssetStatus::Available).unwrap(), AssetStatus::Deployed);
        assert!(check_deploy(AssetStatus::Deployed).is_err());
        assert_eq!(check_return(AssetStatus::Deployed).unwrap(), AssetStatus::Available);
        assert!(check_return(AssetStatus::Available).is_err());
    }

    #[test]
    fn deployed_assets_are_auto_returned_on_retirement() {
        assert!(check_retire("A-1", AssetStatus::Deployed).unwrap().auto_return);
        assert!(!check_retire("A-1", AssetStatus::Available).unwrap().auto_return);
        assert!(check_retire("A-1", AssetStatus::Retired).is_err());
        assert!(check_retire("A-1", AssetStatus::Disposed).is_err());
    }

    #[test]
    fn only_retired_assets_are_disposed() {
        assert_eq!(check_dispose(AssetStatus::Retired).unwrap(), AssetStatus::Disposed);
        assert!(check_dispose(AssetStatus::Available).is_err());
    }

    #[test]
    fn disposal_date_cannot_be_past() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        assert!(validate_disposal_date(today.pred_opt(), today).is_err());
        assert!(validate_disposal_date(Some(today), today).is_ok());
        assert!(validate_disposal_date(None, today).is_ok());
    }

    #[test]
    fn costing_rules() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert!(validate_costing(d("1000"), d("100"), 60).is_ok());
        assert!(validate_costing(d("0"), d("0"), 60).is_err());
        assert!(validate_costing(d("1000"), d("1000"), 60).is_err());
        assert!(validate_costing(d("1000"), d("-1"), 60).is_err());
        assert!(validate_costing(d("1000"), d("0"), 0).is_err());
        assert!(validate_costing(d("1000.001"), d("0"), 12).is_err());
    }

    #[test]
    fn useful_life_and_price_are_bounded() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert!(validate_costing(d("1000"), d("0"), MAX_USEFUL_LIFE_MONTHS).is_ok());
        assert!(validate_costing(d("1000"), d("0"), MAX_USEFUL_LIFE_MONTHS + 1).is_err());
        assert!(validate_costing(d("1000"), d("0"), 1_000_000).is_err());
        assert!(validate_costing(d("9999999999999.99"), d("0"), 12).is_ok());
        assert!(validate_costing(d("10000000000000"), d("0"), 12).is_err());
    }

    #[test]
    fn qr_payload_points_at_lookup_route() {
        assert_eq!(
            qr_payload("https://admin.example.com", "/api", "abc"),
            "https://admin.example.com/api/assets/qr/abc"
        );
    }
}
