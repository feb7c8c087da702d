use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::business_unit::BusinessUnit;
use crate::model::permission::Permission;
use crate::utils::db_utils::{build_update_sql, execute_update};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateBusinessUnit {
    #[schema(example = "HQ")]
    pub code: String,
    #[schema(example = "Head Office")]
    pub name: String,
}

/// Accepted fields of a partial update.
#[derive(Deserialize, ToSchema)]
pub struct UpdateBusinessUnit {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

fn check_update(payload: &Map<String, Value>) -> AppResult<()> {
    if let Some(name) = payload.get("name") {
        if name.as_str().is_none_or(|n| n.trim().is_empty()) {
            return Err(AppError::validation("name cannot be blank"));
        }
    }
    if payload.get("is_active").is_some_and(|v| !v.is_boolean()) {
        return Err(AppError::validation("is_active must be true or false"));
    }
    Ok(())
}

async fn fetch_business_unit(pool: &MySqlPool, id: u64) -> AppResult<BusinessUnit> {
    sqlx::query_as::<_, BusinessUnit>(
        "SELECT id, code, name, is_active, created_at FROM business_units WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Business unit not found"))
}

#[utoipa::path(
    post,
    path = "/api/business-units",
    request_body = CreateBusinessUnit,
    responses(
        (status = 201, body = BusinessUnit),
        (status = 409, description = "Code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Business Units"
)]
pub async fn create_business_unit(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateBusinessUnit>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageBusinessUnits)?;

    let code = payload.code.trim().to_uppercase();
    let name = payload.name.trim();
    if code.is_empty() || code.len() > 20 || name.is_empty() {
        return Err(AppError::validation("code (1-20 characters) and name are required"));
    }

    let result = sqlx::query("INSERT INTO business_units (code, name) VALUES (?, ?)")
        .bind(&code)
        .bind(name)
        .execute(pool.get_ref())
        .await?;

    let created = fetch_business_unit(pool.get_ref(), result.last_insert_id()).await?;
    tracing::info!(business_unit_id = created.id, %code, "Business unit created");
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/business-units",
    responses((status = 200, body = [BusinessUnit])),
    security(("bearer_auth" = [])),
    tag = "Business Units"
)]
pub async fn business_unit_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageBusinessUnits)?;

    let units = sqlx::query_as::<_, BusinessUnit>(
        "SELECT id, code, name, is_active, created_at FROM business_units ORDER BY code",
    )
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(units))
}

/// Admins read any unit; everyone else only their own.
#[utoipa::path(
    get,
    path = "/api/business-units/{id}",
    params(("id" = u64, Path, description = "Business unit id")),
    responses((status = 200, body = BusinessUnit), (status = 404, description = "Business unit not found")),
    security(("bearer_auth" = [])),
    tag = "Business Units"
)]
pub async fn get_business_unit(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let id = path.into_inner();
    if id != auth.business_unit_id && !auth.can(Permission::ManageBusinessUnits) {
        return Err(AppError::not_found("Business unit not found"));
    }
    Ok(HttpResponse::Ok().json(fetch_business_unit(pool.get_ref(), id).await?))
}

#[utoipa::path(
    put,
    path = "/api/business-units/{id}",
    params(("id" = u64, Path, description = "Business unit id")),
    request_body = UpdateBusinessUnit,
    responses((status = 200, body = BusinessUnit)),
    security(("bearer_auth" = [])),
    tag = "Business Units"
)]
pub async fn update_business_unit(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Map<String, Value>>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageBusinessUnits)?;
    let id = path.into_inner();

    if id == auth.business_unit_id && payload.get("is_active") == Some(&Value::Bool(false)) {
        return Err(AppError::validation("You cannot deactivate your own business unit"));
    }

    check_update(&payload)?;
    let update = build_update_sql("business_units", &payload, &["name", "is_active"], id, &[])?;
    execute_update(pool.get_ref(), update).await?;

    // A missing row surfaces here as 404.
    let updated = fetch_business_unit(pool.get_ref(), id).await?;
    tracing::info!(business_unit_id = id, "Business unit updated");
    Ok(HttpResponse::Ok().json(updated))
}

#[cfg(test)]
mod tests {
    use super::check_update;
    use crate::utils::db_utils::{SqlValue, build_update_sql};
    use serde_json::json;

    #[test]
    fn name_and_flag_are_checked() {
        let ok = json!({"name": "Branch", "is_active": true}).as_object().cloned().unwrap();
        assert!(check_update(&ok).is_ok());
        let null_name = json!({"name": null}).as_object().cloned().unwrap();
        assert!(check_update(&null_name).is_err());
        let text_flag = json!({"is_active": "no"}).as_object().cloned().unwrap();
        assert!(check_update(&text_flag).is_err());
    }

    #[test]
    fn code_is_not_updatable() {
        let payload = json!({"code": "XX"}).as_object().cloned().unwrap();
        assert!(build_update_sql("business_units", &payload, &["name", "is_active"], 1, &[]).is_err());
    }

    #[test]
    fn activation_toggle_binds_bool() {
        let payload = json!({"is_active": false}).as_object().cloned().unwrap();
        let update = build_update_sql("business_units", &payload, &["name", "is_active"], 4, &[]).unwrap();
        assert_eq!(update.values, vec![SqlValue::Bool(false), SqlValue::U64(4)]);
    }
}
