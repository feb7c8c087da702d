use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ledger::{AccountType, NormalBalance};

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct GlAccount {
    pub id: u64,
    pub business_unit_id: u64,
    #[schema(example = "6100")]
    pub code: String,
    #[schema(example = "Depreciation Expense")]
    pub name: String,
    #[sqlx(try_from = "String")]
    pub account_type: AccountType,
    #[sqlx(try_from = "String")]
    pub normal_balance: NormalBalance,
    pub is_active: bool,
    pub description: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
