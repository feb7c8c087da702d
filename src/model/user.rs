use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// User as exposed by the API; the password hash never leaves `models::UserSql`.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    #[schema(example = 12)]
    pub id: u64,
    pub business_unit_id: u64,
    #[schema(nullable = true)]
    pub department_id: Option<u64>,
    /// Direct manager, first stage of the approval chain
    #[schema(nullable = true)]
    pub manager_id: Option<u64>,
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = 3)]
    pub role_id: u8,
    pub is_active: bool,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub last_login_at: Option<DateTime<Utc>>,
}
