use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::approval::ApprovalStatus;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct OvertimeRequest {
    pub id: u64,
    pub business_unit_id: u64,
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(value_type = String, example = "2026-02-10T17:00:00")]
    pub start_at: NaiveDateTime,
    #[schema(value_type = String, example = "2026-02-10T20:30:00")]
    pub end_at: NaiveDateTime,
    #[schema(value_type = String, example = "3.50")]
    pub hours: Decimal,
    pub reason: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ApprovalStatus,
    pub manager_action_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub manager_action_at: Option<DateTime<Utc>>,
    pub manager_comments: Option<String>,
    pub hr_action_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub hr_action_at: Option<DateTime<Utc>>,
    pub hr_comments: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
