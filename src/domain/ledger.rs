use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl TryFrom<String> for AccountType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for NormalBalance {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl AccountType {
    pub fn default_normal_balance(self) -> NormalBalance {
        match self {
            AccountType::Asset | AccountType::Expense => NormalBalance::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                NormalBalance::Credit
            }
        }
    }
}

pub const MAX_CODE_LENGTH: usize = 20;

pub fn validate_code(code: &str) -> AppResult<()> {
    if code.is_empty() || code.len() > MAX_CODE_LENGTH {
        return Err(AppError::validation(format!(
            "Account code must be 1-{MAX_CODE_LENGTH} characters"
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(AppError::validation(format!(
            "Account code '{code}' may only contain letters, digits, '-' and '.'"
        )));
    }
    Ok(())
}

/// Accounts a depreciation entry may be recorded against: an active expense
/// account for the charge and an active asset (contra) account for the
/// accumulated depreciation.
pub fn check_depreciation_account(
    role: &str,
    account_type: AccountType,
    is_active: bool,
    expected: AccountType,
) -> AppResult<()> {
    if !is_active {
        return Err(AppError::validation(format!("The {role} account is inactive")));
    }
    if account_type != expected {
        return Err(AppError::validation(format!(
            "The {role} account must be of type {}, got {}",
            expected.as_ref(),
            account_type.as_ref()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_balance_defaults() {
        assert_eq!(AccountType::Asset.default_normal_balance(), NormalBalance::Debit);
        assert_eq!(AccountType::Expense.default_normal_balance(), NormalBalance::Debit);
        assert_eq!(AccountType::Liability.default_normal_balance(), NormalBalance::Credit);
        assert_eq!(AccountType::Equity.default_normal_balance(), NormalBalance::Credit);
        assert_eq!(AccountType::Revenue.default_normal_balance(), NormalBalance::Credit);
    }

    #[test]
    fn code_validation() {
        assert!(validate_code("6100-01").is_ok());
        assert!(validate_code("1.2.3").is_ok());
        assert!(validate_code("").is_err());
        assert!(validate_code("61 00").is_err());
        assert!(validate_code(&"9".repeat(21)).is_err());
    }

    #[test]
    fn depreciation_accounts_checked_for_type_and_activity() {
        assert!(check_depreciation_account("expense", AccountType::Expense, true, AccountType::Expense).is_ok());
        assert!(check_depreciation_account("expense", AccountType::Expense, false, AccountType::Expense).is_err());
        assert!(check_depreciation_account("accumulated", AccountType::Liability, true, AccountType::Asset).is_err());
    }
}
