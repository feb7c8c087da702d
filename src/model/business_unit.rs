use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct BusinessUnit {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "HQ")]
    pub code: String,
    #[schema(example = "Head Office")]
    pub name: String,
    pub is_active: bool,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}
