use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AppError;
use crate::model::{permission::Permission, role::Role};
use crate::models::{Claims, TokenType};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    /// Tenant every query of this caller is scoped to
    pub business_unit_id: u64,
}

impl AuthUser {
    pub fn from_claims(claims: Claims) -> Result<Self, AppError> {
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }

        let role = Role::from_id(claims.role)
            .ok_or_else(|| AppError::Unauthorized("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            business_unit_id: claims.business_unit_id,
        })
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.role.has(permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.can(permission) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = self.user_id,
                username = %self.username,
                role = self.role.as_ref(),
                permission = permission.as_ref(),
                "Permission denied"
            );
            Err(AppError::forbidden(format!(
                "Missing permission {}",
                permission.as_ref()
            )))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Protected scope: the middleware already validated the token.
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(AppError::Unauthorized("Missing token".into()).into())),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(AppError::Internal("Config missing".into()).into())),
        };

        let result = verify_token(token, &config.jwt_secret)
            .map_err(|_| AppError::Unauthorized("Invalid token".into()))
            .and_then(AuthUser::from_claims)
            .map_err(actix_web::Error::from);

        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: u8, token_type: TokenType) -> Claims {
        Claims {
            user_id: 11,
            sub: "mgr".into(),
            role,
            business_unit_id: 3,
            exp: usize::MAX,
            jti: "jti".into(),
            token_type,
        }
    }

    #[test]
    fn refresh_token_cannot_authenticate_requests() {
        let err = AuthUser::from_claims(claims(1, TokenType::Refresh)).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn unknown_role_id_rejected() {
        assert!(AuthUser::from_claims(claims(99, TokenType::Access)).is_err());
    }

    #[test]
    fn require_reports_forbidden() {
        let user = AuthUser::from_claims(claims(3, TokenType::Access)).unwrap();
        assert!(matches!(
            user.require(Permission::ManageAssets),
            Err(AppError::Forbidden(_))
        ));
        assert!(!user.is_admin());
    }

    #[test]
    fn admin_passes_every_gate() {
        let user = AuthUser::from_claims(claims(1, TokenType::Access)).unwrap();
        assert!(user.require(Permission::OverrideDepreciationCalendar).is_ok());
        assert!(user.is_admin());
    }
}
