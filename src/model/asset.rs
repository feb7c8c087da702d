use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::asset::AssetStatus;
use crate::domain::depreciation::{DepreciationBasis, DepreciationMethod};

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Asset {
    pub id: u64,
    pub business_unit_id: u64,
    #[schema(example = "IT-LPT-0042")]
    pub code: String,
    #[schema(example = "ThinkPad T14 Gen 4")]
    pub description: String,
    #[schema(example = "IT Equipment")]
    pub category: String,
    pub serial_number: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub purchase_date: NaiveDate,
    #[schema(value_type = String, example = "1500.00")]
    pub purchase_price: Decimal,
    #[schema(value_type = String, example = "150.00")]
    pub salvage_value: Decimal,
    #[sqlx(try_from = "String")]
    pub depreciation_method: DepreciationMethod,
    #[schema(example = 36)]
    pub useful_life_months: u32,
    #[schema(value_type = String, format = "date")]
    pub depreciation_start_date: NaiveDate,
    #[schema(value_type = String)]
    pub accumulated_depreciation: Decimal,
    #[schema(value_type = String)]
    pub current_book_value: Decimal,
    #[schema(value_type = Option<String>, format = "date")]
    pub last_depreciation_date: Option<NaiveDate>,
    #[sqlx(try_from = "String")]
    pub status: AssetStatus,
    pub qr_token: String,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub retired_at: Option<DateTime<Utc>>,
    pub retirement_reason: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub disposal_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub disposed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn depreciation_basis(&self) -> DepreciationBasis {
        DepreciationBasis {
            method: self.depreciation_method,
            cost: self.purchase_price,
            salvage: self.salvage_value,
            useful_life_months: self.useful_life_months,
            start_date: self.depreciation_start_date,
            book_value: self.current_book_value,
            last_period: self.last_depreciation_date,
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AssetDeployment {
    pub id: u64,
    pub asset_id: u64,
    pub user_id: u64,
    pub deployed_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub deployed_at: DateTime<Utc>,
    pub notes: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub returned_at: Option<DateTime<Utc>>,
    pub return_notes: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct DepreciationEntry {
    pub id: u64,
    pub asset_id: u64,
    #[schema(value_type = String, format = "date")]
    pub period: NaiveDate,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub book_value_after: Decimal,
    pub expense_account_id: Option<u64>,
    pub accumulated_account_id: Option<u64>,
    pub posted_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub posted_at: DateTime<Utc>,
}
