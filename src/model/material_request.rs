use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::material::{LineState, MaterialContext, MaterialStatus};

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct MaterialRequest {
    pub id: u64,
    pub business_unit_id: u64,
    #[schema(example = "MRS-202603-0007")]
    pub reference: String,
    pub user_id: u64,
    pub department_id: u64,
    pub purpose: String,
    pub rec_approver_id: u64,
    pub final_approver_id: u64,
    #[sqlx(try_from = "String")]
    pub status: MaterialStatus,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub rec_approved_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub final_approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub acknowledged_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub supplier: Option<String>,
    pub po_number: Option<String>,
    pub posted_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub posted_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub done_at: Option<DateTime<Utc>>,
    pub is_marked_for_edit: bool,
    pub marked_for_edit_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub marked_for_edit_at: Option<DateTime<Utc>>,
    pub edit_reason: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub edit_completed_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl MaterialRequest {
    pub fn context(&self) -> MaterialContext {
        MaterialContext {
            business_unit_id: self.business_unit_id,
            owner_id: self.user_id,
            rec_approver_id: self.rec_approver_id,
            final_approver_id: self.final_approver_id,
            status: self.status,
            is_marked_for_edit: self.is_marked_for_edit,
            acknowledged: self.acknowledged_at.is_some(),
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct MaterialRequestItem {
    pub id: u64,
    pub material_request_id: u64,
    #[schema(example = "CEM-40KG")]
    pub item_code: String,
    #[schema(example = "Portland cement, 40kg bag")]
    pub description: String,
    #[schema(example = "BAG")]
    pub uom: String,
    #[schema(value_type = String, example = "20.00")]
    pub quantity: Decimal,
    #[schema(value_type = String, example = "5.00")]
    pub quantity_served: Decimal,
    pub remarks: Option<String>,
}

impl MaterialRequestItem {
    pub fn line_state(&self) -> LineState {
        LineState {
            item_id: self.id,
            quantity: self.quantity,
            quantity_served: self.quantity_served,
        }
    }
}
