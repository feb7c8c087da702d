use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    web::Data,
};
use serde_json::json;

fn bearer_token(req: &ServiceRequest) -> Result<&str, String> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?
        .to_str()
        .map_err(|_| "Invalid Authorization header encoding".to_string())?;

    value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| "Authorization header must be `Bearer <token>`".to_string())
}

fn unauthorized(req: ServiceRequest, message: String) -> ServiceResponse<BoxBody> {
    tracing::debug!(path = %req.path(), reason = %message, "Request rejected");
    let resp = HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, "Bearer"))
        .json(json!({ "message": message }));
    req.into_response(resp.map_into_boxed_body())
}

/// Resolves the access token into an [`AuthUser`] for the handlers. Refresh
/// tokens and unknown roles are turned away here.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let authenticated = bearer_token(&req)
        .and_then(|token| {
            verify_token(token, &config.jwt_secret)
                .map_err(|e| format!("Invalid or expired token: {e}"))
        })
        .and_then(|claims| AuthUser::from_claims(claims).map_err(|e| e.to_string()));

    let auth_user = match authenticated {
        Ok(user) => user,
        Err(message) => return Ok(unauthorized(req, message)),
    };

    tracing::debug!(
        user_id = auth_user.user_id,
        business_unit_id = auth_user.business_unit_id,
        path = %req.path(),
        "Authenticated request"
    );
    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
