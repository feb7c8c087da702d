use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::approval::ApprovalStatus;
use crate::domain::leave::LeaveType;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "business_unit_id": 1,
    "user_id": 1000,
    "leave_type": "SICK",
    "start_date": "2026-01-05",
    "end_date": "2026-01-07",
    "days": 3,
    "reason": "Flu",
    "status": "PENDING_MANAGER",
    "created_at": "2026-01-01T00:00:00Z"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub business_unit_id: u64,
    /// owner of the request
    pub user_id: u64,
    #[sqlx(try_from = "String")]
    pub leave_type: LeaveType,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    /// working days covered
    pub days: u32,
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

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct LeaveBalance {
    pub user_id: u64,
    #[sqlx(try_from = "String")]
    pub leave_type: LeaveType,
    pub year: u16,
    pub allotted: u32,
    pub used: u32,
}
