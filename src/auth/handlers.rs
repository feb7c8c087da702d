use crate::{
    auth::{
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::{AppError, AppResult},
    models::{Claims, LoginReqDto, TokenType, UserSql},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Serialize;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    error!(error = %e, "Token signing failed");
    AppError::Internal("Token signing failed".into())
}

/// Issues a fresh access/refresh pair and records the refresh token.
async fn issue_pair(
    conn: &mut MySqlConnection,
    user: &UserSql,
    config: &Config,
) -> AppResult<TokenPair> {
    let subject = TokenSubject {
        user_id: user.id,
        username: user.username.clone(),
        role: user.role_id,
        business_unit_id: user.business_unit_id,
    };

    let access_token = generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl)
        .map_err(token_error)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(token_error)?;

    debug!(user_id = user.id, jti = %refresh_claims.jti, "Storing refresh token");
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user.id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(&mut *conn)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

async fn load_user_by(conn: &mut MySqlConnection, column: &str, value: &str) -> AppResult<Option<UserSql>> {
    let sql = format!(
        r#"
        SELECT u.id, u.username, u.password, u.role_id, u.business_unit_id,
               u.is_active, b.is_active AS unit_active
        FROM users u
        JOIN business_units b ON b.id = u.business_unit_id
        WHERE u.{column} = ?
        "#
    );
    Ok(sqlx::query_as::<_, UserSql>(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Invalid credentials or inactive account")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(pool, config, user), fields(username = %user.username))]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        return Err(AppError::validation("Username and password are required"));
    }

    let mut conn = pool.acquire().await?;
    let username = user.username.trim().to_lowercase();
    let Some(db_user) = load_user_by(&mut conn, "username", &username).await? else {
        info!("Invalid credentials: user not found");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !(db_user.is_active && db_user.unit_active) {
        info!(user_id = db_user.id, "Login refused: account or business unit inactive");
        return Err(AppError::Unauthorized("Account is inactive".into()));
    }

    let pair = issue_pair(&mut conn, &db_user, &config).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(&mut *conn)
        .await
    {
        // Not worth failing the login over.
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");
    Ok(HttpResponse::Ok().json(pair))
}

fn refresh_claims(req: &HttpRequest, config: &Config) -> AppResult<Claims> {
    let token = bearer(req).ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;
    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }
    Ok(claims)
}

/// Rotates a refresh token. Role and business unit are re-read, so changes
/// made by an administrator take effect on the next refresh.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, revoked or expired refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let claims = refresh_claims(&req, &config)?;

    let mut tx = pool.begin().await?;

    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()",
    )
    .bind(&claims.jti)
    .execute(&mut *tx)
    .await?;
    if revoked.rows_affected() == 0 {
        info!(user_id = claims.user_id, "Refresh refused: token unknown, revoked or expired");
        return Err(AppError::Unauthorized("Refresh token is no longer valid".into()));
    }

    let db_user = load_user_by(&mut tx, "id", &claims.user_id.to_string())
        .await?
        .filter(|u| u.is_active && u.unit_active)
        .ok_or_else(|| AppError::Unauthorized("Account is inactive".into()))?;

    let pair = issue_pair(&mut tx, &db_user, &config).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(pair))
}

/// Revokes the presented refresh token. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let Ok(claims) = refresh_claims(&req, &config) else {
        return Ok(HttpResponse::NoContent().finish());
    };

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await?;

    info!(user_id = claims.user_id, "Logged out");
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn config() -> Config {
        Config {
            database_url: String::new(),
            db_max_connections: 1,
            run_migrations: false,
            jwt_secret: "handler-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 60,
            refresh_token_ttl: 120,
            rate_login_per_min: 60,
            rate_refresh_per_min: 60,
            rate_protected_per_min: 60,
            api_prefix: "/api".into(),
            public_base_url: "http://localhost".into(),
            disposal_sweep_secs: 0,
            bootstrap_admin: None,
            log_dir: "logs".into(),
            log_level: tracing::Level::INFO,
        }
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 3,
            username: "hr".into(),
            role: 2,
            business_unit_id: 1,
        }
    }

    #[test]
    fn refresh_requires_refresh_token() {
        let config = config();
        let access = generate_access_token(&subject(), &config.jwt_secret, 60).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_http_request();
        assert!(matches!(refresh_claims(&req, &config), Err(AppError::Unauthorized(_))));

        let (refresh, issued) = generate_refresh_token(&subject(), &config.jwt_secret, 60).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_http_request();
        assert_eq!(refresh_claims(&req, &config).unwrap().jti, issued.jti);
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert!(refresh_claims(&req, &config()).is_err());
    }
}
