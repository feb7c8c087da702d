use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::permission::Permission;
use crate::model::role::Role;
use crate::model::user::User;
use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct Me {
    pub user: User,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// The signed-in user with the role and permissions the UI gates on.
#[utoipa::path(
    get,
    path = "/api/me",
    responses((status = 200, body = Me), (status = 401, description = "Unauthorized")),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<impl Responder> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, business_unit_id, department_id, manager_id, username, full_name, role_id,
               is_active, last_login_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;

    Ok(HttpResponse::Ok().json(Me {
        user,
        role: auth.role,
        permissions: auth.role.permissions().to_vec(),
    }))
}
