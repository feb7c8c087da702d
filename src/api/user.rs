use crate::auth::auth::AuthUser;
use crate::auth::password::hash_password;
use crate::error::{AppError, AppResult};
use crate::model::permission::Permission;
use crate::model::role::Role;
use crate::model::user::User;
use crate::utils::db_utils::{Filters, Page, SqlValue, bind_values};
use crate::utils::{username_cache, username_filter};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

const USER_COLUMNS: &str = r#"
    id, business_unit_id, department_id, manager_id, username, full_name, role_id,
    is_active, last_login_at
"#;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = 3)]
    pub role_id: u8,
    pub department_id: Option<u64>,
    pub manager_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUser {
    pub full_name: Option<String>,
    pub role_id: Option<u8>,
    /// `null` leaves it unchanged; use `clear_manager` to remove
    pub department_id: Option<u64>,
    pub manager_id: Option<u64>,
    #[serde(default)]
    pub clear_manager: bool,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, IntoParams)]
pub struct UserFilter {
    pub role_id: Option<u8>,
    pub department_id: Option<u64>,
    pub manager_id: Option<u64>,
    pub is_active: Option<bool>,
    /// Username or full name
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<User>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

fn parse_role(actor: &AuthUser, role_id: u8) -> AppResult<Role> {
    let role = Role::from_id(role_id)
        .ok_or_else(|| AppError::validation(format!("Unknown role id {role_id}")))?;
    if role == Role::Admin && !actor.is_admin() {
        return Err(AppError::forbidden("Only administrators can grant the admin role"));
    }
    Ok(role)
}

fn validate_username(username: &str) -> AppResult<()> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if username.len() < 3 || username.len() > 50 || !valid_chars {
        return Err(AppError::validation(
            "Username must be 3-50 characters of letters, digits, '.', '_' or '-'",
        ));
    }
    Ok(())
}

/// true when nobody holds `username`. The filter answers definite misses,
/// the cache known hits, the database everything else.
pub async fn is_username_available(pool: &MySqlPool, username: &str) -> AppResult<bool> {
    if !username_filter::might_exist(username) {
        return Ok(true);
    }
    if username_cache::is_taken(username) {
        return Ok(false);
    }

    let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(username_filter::normalize(username))
        .fetch_one(pool)
        .await?;
    let exists = found > 0;
    if exists {
        username_cache::mark_taken(username).await;
    }
    Ok(!exists)
}

async fn check_member(
    conn: &mut MySqlConnection,
    table: &str,
    id: u64,
    business_unit_id: u64,
    label: &str,
) -> AppResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ? AND business_unit_id = ?");
    let found = sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .bind(business_unit_id)
        .fetch_one(&mut *conn)
        .await?;
    if found == 0 {
        return Err(AppError::validation(format!("{label} {id} is not in your business unit")));
    }
    Ok(())
}

async fn fetch_user(conn: &mut MySqlConnection, user_id: u64, business_unit_id: u64) -> AppResult<User> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND business_unit_id = ?");
    sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .bind(business_unit_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

/* =========================
Provision user
========================= */
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created in the caller's business unit", body = User),
        (status = 400, description = "Invalid username, password, role or references"),
        (status = 409, description = "Username already taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(name = "user_create", skip_all, fields(username = %payload.username))]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageUsers)?;

    let username = username_filter::normalize(&payload.username);
    validate_username(&username)?;
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::validation("full_name is required"));
    }
    let role = parse_role(&auth, payload.role_id)?;

    if !is_username_available(pool.get_ref(), &username).await? {
        return Err(AppError::conflict("Username already taken"));
    }

    let mut conn = pool.acquire().await?;
    if let Some(department_id) = payload.department_id {
        check_member(&mut conn, "departments", department_id, auth.business_unit_id, "Department").await?;
    }
    if let Some(manager_id) = payload.manager_id {
        check_member(&mut conn, "users", manager_id, auth.business_unit_id, "Manager").await?;
    }

    let hashed = hash_password(&payload.password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        AppError::Internal("Password hashing failed".into())
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO users
            (business_unit_id, department_id, manager_id, username, password, full_name, role_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.business_unit_id)
    .bind(payload.department_id)
    .bind(payload.manager_id)
    .bind(&username)
    .bind(hashed)
    .bind(full_name)
    .bind(role.id())
    .execute(&mut *conn)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::conflict("Username already taken"),
        other => other,
    })?;

    username_filter::insert(&username);
    username_cache::mark_taken(&username).await;

    let created = fetch_user(&mut conn, result.last_insert_id(), auth.business_unit_id).await?;
    tracing::info!(user_id = created.id, role = role.as_ref(), "User provisioned");
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/users/username-available",
    params(UsernameQuery),
    responses((status = 200, description = "`{\"available\": bool}`")),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn username_available(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UsernameQuery>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageUsers)?;
    let available = is_username_available(pool.get_ref(), &query.username).await?;
    Ok(HttpResponse::Ok().json(json!({ "available": available })))
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(UserFilter),
    responses((status = 200, body = UserListResponse)),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn user_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserFilter>,
) -> AppResult<impl Responder> {
    let page = Page::new(query.page, query.per_page);

    let mut filters = Filters::new();
    filters
        .push("business_unit_id = ?", [SqlValue::U64(auth.business_unit_id)])
        .push_opt("role_id = ?", query.role_id.map(|r| SqlValue::U64(r.into())))
        .push_opt("department_id = ?", query.department_id.map(SqlValue::U64))
        .push_opt("manager_id = ?", query.manager_id.map(SqlValue::U64))
        .push_opt("is_active = ?", query.is_active.map(SqlValue::Bool))
        .search(&["username", "full_name"], query.search.as_deref());
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM users{where_sql}");
    let total = bind_values!(
        sqlx::query_scalar::<_, i64>(&count_sql),
        filters.values()
    )
    .fetch_one(pool.get_ref())
    .await?;

    let data_sql = format!("SELECT {USER_COLUMNS} FROM users{where_sql} ORDER BY full_name LIMIT ? OFFSET ?");
    let data = bind_values!(sqlx::query_as::<_, User>(&data_sql), filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(UserListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User id")),
    responses((status = 200, body = User), (status = 404, description = "User not found")),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let mut conn = pool.acquire().await?;
    let user = fetch_user(&mut conn, path.into_inner(), auth.business_unit_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Reassign manager / department / role, or (de)activate.
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User id")),
    request_body = UpdateUser,
    responses((status = 200, body = User), (status = 400, description = "Invalid reference")),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(name = "user_update", skip_all, fields(user_id = *path))]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUser>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageUsers)?;
    let user_id = path.into_inner();

    let mut conn = pool.acquire().await?;
    let existing = fetch_user(&mut conn, user_id, auth.business_unit_id).await?;
    if existing.role_id == Role::Admin.id() && !auth.is_admin() {
        return Err(AppError::forbidden("Only administrators can change an administrator"));
    }

    let mut assignments = Vec::new();
    let mut values = Vec::new();

    if let Some(full_name) = payload.full_name.as_deref().map(str::trim) {
        if full_name.is_empty() {
            return Err(AppError::validation("full_name cannot be blank"));
        }
        assignments.push("full_name = ?");
        values.push(SqlValue::String(full_name.to_string()));
    }
    if let Some(role_id) = payload.role_id {
        let role = parse_role(&auth, role_id)?;
        assignments.push("role_id = ?");
        values.push(SqlValue::U64(role.id().into()));
    }
    if let Some(department_id) = payload.department_id {
        check_member(&mut conn, "departments", department_id, auth.business_unit_id, "Department").await?;
        assignments.push("department_id = ?");
        values.push(SqlValue::U64(department_id));
    }
    if payload.clear_manager {
        assignments.push("manager_id = NULL");
    } else if let Some(manager_id) = payload.manager_id {
        if manager_id == user_id {
            return Err(AppError::validation("A user cannot be their own manager"));
        }
        check_member(&mut conn, "users", manager_id, auth.business_unit_id, "Manager").await?;
        assignments.push("manager_id = ?");
        values.push(SqlValue::U64(manager_id));
    }
    if let Some(is_active) = payload.is_active {
        if !is_active && user_id == auth.user_id {
            return Err(AppError::validation("You cannot deactivate yourself"));
        }
        assignments.push("is_active = ?");
        values.push(SqlValue::Bool(is_active));
    }

    if assignments.is_empty() {
        return Err(AppError::validation("No fields provided for update"));
    }

    let sql = format!(
        "UPDATE users SET {} WHERE id = ? AND business_unit_id = ?",
        assignments.join(", ")
    );
    bind_values!(sqlx::query(&sql), &values)
        .bind(user_id)
        .bind(auth.business_unit_id)
        .execute(&mut *conn)
        .await?;

    if payload.is_active == Some(false) {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ? AND revoked = FALSE")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
    }

    let updated = fetch_user(&mut conn, user_id, auth.business_unit_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "root".into(),
            role,
            business_unit_id: 1,
        }
    }

    #[test]
    fn only_admin_grants_admin() {
        assert_eq!(parse_role(&actor(Role::Admin), 1).unwrap(), Role::Admin);
        assert!(matches!(parse_role(&actor(Role::Hr), 1), Err(AppError::Forbidden(_))));
        assert_eq!(parse_role(&actor(Role::Hr), 4).unwrap(), Role::Manager);
        assert!(matches!(parse_role(&actor(Role::Hr), 9), Err(AppError::Validation(_))));
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("j.doe-2").is_ok());
        assert!(validate_username("jd").is_err());
        assert!(validate_username("john doe").is_err());
    }
}
