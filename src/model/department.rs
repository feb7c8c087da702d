use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Department {
    #[schema(example = 4)]
    pub id: u64,
    #[schema(example = 1)]
    pub business_unit_id: u64,
    #[schema(example = "Engineering")]
    pub name: String,
}
