use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::department::Department;
use crate::model::permission::Permission;
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateDepartment {
    #[schema(example = "Engineering")]
    pub name: String,
}

#[utoipa::path(
    post,
    path = "/api/departments",
    request_body = CreateDepartment,
    responses(
        (status = 201, body = Department),
        (status = 409, description = "Department name already used in this business unit")
    ),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDepartment>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageDepartments)?;

    let name = payload.name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(AppError::validation("Department name must be 1-100 characters"));
    }

    let result = sqlx::query("INSERT INTO departments (business_unit_id, name) VALUES (?, ?)")
        .bind(auth.business_unit_id)
        .bind(name)
        .execute(pool.get_ref())
        .await?;

    let created = Department {
        id: result.last_insert_id(),
        business_unit_id: auth.business_unit_id,
        name: name.to_string(),
    };
    tracing::info!(department_id = created.id, "Department created");
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/departments",
    responses((status = 200, body = [Department])),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn department_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    let departments = sqlx::query_as::<_, Department>(
        "SELECT id, business_unit_id, name FROM departments WHERE business_unit_id = ? ORDER BY name",
    )
    .bind(auth.business_unit_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(departments))
}
