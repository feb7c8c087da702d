use crate::auth::auth::AuthUser;
use crate::domain::ledger::{self, AccountType, NormalBalance};
use crate::error::{AppError, AppResult};
use crate::model::gl_account::GlAccount;
use crate::model::permission::Permission;
use crate::utils::db_utils::{Filters, Page, SqlValue, bind_values, build_update_sql, execute_update};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

const GL_COLUMNS: &str =
    "id, business_unit_id, code, name, account_type, normal_balance, is_active, description, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateGlAccount {
    #[schema(example = "6100")]
    pub code: String,
    #[schema(example = "Depreciation Expense")]
    pub name: String,
    pub account_type: AccountType,
    /// Defaults from the account type
    pub normal_balance: Option<NormalBalance>,
    pub description: Option<String>,
}

/// Accepted fields of a partial account update.
#[derive(Deserialize, ToSchema)]
pub struct UpdateGlAccount {
    pub name: Option<String>,
    pub description: Option<String>,
    pub normal_balance: Option<NormalBalance>,
}

#[derive(Deserialize, IntoParams)]
pub struct GlAccountFilter {
    pub account_type: Option<AccountType>,
    pub is_active: Option<bool>,
    /// Code or name
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct GlAccountListResponse {
    pub data: Vec<GlAccount>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

async fn fetch_account(pool: &MySqlPool, id: u64, business_unit_id: u64) -> AppResult<GlAccount> {
    sqlx::query_as::<_, GlAccount>(&format!(
        "SELECT {GL_COLUMNS} FROM gl_accounts WHERE id = ? AND business_unit_id = ?"
    ))
    .bind(id)
    .bind(business_unit_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("GL account not found"))
}

/// Checks a partial update body before it reaches the SQL builder.
fn check_update(payload: &Map<String, Value>) -> AppResult<()> {
    if let Some(name) = payload.get("name") {
        if name.as_str().map_or(true, |n| n.trim().is_empty()) {
            return Err(AppError::validation("name cannot be blank"));
        }
    }
    if let Some(balance) = payload.get("normal_balance") {
        let valid = balance
            .as_str()
            .is_some_and(|b| b.parse::<NormalBalance>().is_ok());
        if !valid {
            return Err(AppError::validation("normal_balance must be DEBIT or CREDIT"));
        }
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/gl-accounts",
    request_body = CreateGlAccount,
    responses(
        (status = 201, body = GlAccount),
        (status = 400, description = "Invalid code or name"),
        (status = 409, description = "Code already exists in this business unit")
    ),
    security(("bearer_auth" = [])),
    tag = "GL Accounts"
)]
pub async fn create_gl_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateGlAccount>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageGlAccounts)?;

    let code = payload.code.trim();
    ledger::validate_code(code)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name is required"));
    }
    let normal_balance = payload
        .normal_balance
        .unwrap_or_else(|| payload.account_type.default_normal_balance());

    let result = sqlx::query(
        r#"
        INSERT INTO gl_accounts (business_unit_id, code, name, account_type, normal_balance, description)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.business_unit_id)
    .bind(code)
    .bind(name)
    .bind(payload.account_type.as_ref())
    .bind(normal_balance.as_ref())
    .bind(payload.description.as_deref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::conflict(format!("Account code {code} already exists")),
        other => other,
    })?;

    let created = fetch_account(pool.get_ref(), result.last_insert_id(), auth.business_unit_id).await?;
    tracing::info!(account_id = created.id, code, "GL account created");
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/gl-accounts",
    params(GlAccountFilter),
    responses((status = 200, body = GlAccountListResponse)),
    security(("bearer_auth" = [])),
    tag = "GL Accounts"
)]
pub async fn gl_account_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<GlAccountFilter>,
) -> AppResult<impl Responder> {
    let page = Page::new(query.page, query.per_page);

    let mut filters = Filters::new();
    filters
        .push("business_unit_id = ?", [SqlValue::U64(auth.business_unit_id)])
        .push_opt(
            "account_type = ?",
            query.account_type.map(|t| SqlValue::String(t.as_ref().to_string())),
        )
        .push_opt("is_active = ?", query.is_active.map(SqlValue::Bool))
        .search(&["code", "name"], query.search.as_deref());
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM gl_accounts{where_sql}");
    let total = bind_values!(
        sqlx::query_scalar::<_, i64>(&count_sql),
        filters.values()
    )
    .fetch_one(pool.get_ref())
    .await?;

    let data_sql = format!("SELECT {GL_COLUMNS} FROM gl_accounts{where_sql} ORDER BY code LIMIT ? OFFSET ?");
    let data = bind_values!(sqlx::query_as::<_, GlAccount>(&data_sql), filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(GlAccountListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/gl-accounts/{id}",
    params(("id" = u64, Path, description = "GL account id")),
    responses((status = 200, body = GlAccount), (status = 404, description = "GL account not found")),
    security(("bearer_auth" = [])),
    tag = "GL Accounts"
)]
pub async fn get_gl_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let account = fetch_account(pool.get_ref(), path.into_inner(), auth.business_unit_id).await?;
    Ok(HttpResponse::Ok().json(account))
}

/// Name, description and normal balance; code and type are fixed once used.
#[utoipa::path(
    put,
    path = "/api/gl-accounts/{id}",
    params(("id" = u64, Path, description = "GL account id")),
    request_body = UpdateGlAccount,
    responses((status = 200, body = GlAccount), (status = 400, description = "Field cannot be updated")),
    security(("bearer_auth" = [])),
    tag = "GL Accounts"
)]
pub async fn update_gl_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Map<String, Value>>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageGlAccounts)?;
    let id = path.into_inner();

    check_update(&payload)?;
    let update = build_update_sql(
        "gl_accounts",
        &payload,
        &["name", "description", "normal_balance"],
        id,
        &[("business_unit_id", SqlValue::U64(auth.business_unit_id))],
    )?;
    execute_update(pool.get_ref(), update).await?;

    let updated = fetch_account(pool.get_ref(), id, auth.business_unit_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

async fn set_active(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    id: u64,
    active: bool,
) -> AppResult<HttpResponse> {
    auth.require(Permission::ManageGlAccounts)?;

    sqlx::query("UPDATE gl_accounts SET is_active = ? WHERE id = ? AND business_unit_id = ?")
        .bind(active)
        .bind(id)
        .bind(auth.business_unit_id)
        .execute(pool.get_ref())
        .await?;

    let updated = fetch_account(pool.get_ref(), id, auth.business_unit_id).await?;
    tracing::info!(account_id = id, active, "GL account activation changed");
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    put,
    path = "/api/gl-accounts/{id}/activate",
    params(("id" = u64, Path, description = "GL account id")),
    responses((status = 200, body = GlAccount)),
    security(("bearer_auth" = [])),
    tag = "GL Accounts"
)]
pub async fn activate_gl_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    set_active(auth, pool, path.into_inner(), true).await
}

#[utoipa::path(
    put,
    path = "/api/gl-accounts/{id}/deactivate",
    params(("id" = u64, Path, description = "GL account id")),
    responses((status = 200, body = GlAccount)),
    security(("bearer_auth" = [])),
    tag = "GL Accounts"
)]
pub async fn deactivate_gl_account(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    set_active(auth, pool, path.into_inner(), false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn update_checks_name_and_balance() {
        assert!(check_update(&obj(json!({"name": "Cash"}))).is_ok());
        assert!(check_update(&obj(json!({"name": "  "}))).is_err());
        assert!(check_update(&obj(json!({"normal_balance": "CREDIT"}))).is_ok());
        assert!(check_update(&obj(json!({"normal_balance": "SIDEWAYS"}))).is_err());
        assert!(check_update(&obj(json!({"normal_balance": 1}))).is_err());
    }
}
