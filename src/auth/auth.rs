use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::Role;
use crate::models::TokenType;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_num: Option<String>,
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    // set by auth_middleware on protected scopes
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token =
        bearer_token(req).ok_or_else(|| ApiError::Unauthorized("Missing token".into()))?;

    let config = req.app_data::<Data<Config>>().ok_or_else(|| {
        tracing::error!("Config missing from app data");
        ApiError::Internal
    })?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid token".into()))?;

    if claims.token_type != TokenType::Access {
        return Err(ApiError::Unauthorized("Access token required".into()));
    }

    let role = Role::from_id(claims.role)
        .ok_or_else(|| ApiError::Unauthorized("Invalid role".into()))?;

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_num: claims.employee_num,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin only".into()))
        }
    }

    pub fn require_manager(&self) -> Result<(), ApiError> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Manager/Admin only".into()))
        }
    }

    pub fn is_manager(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Manager)
    }

    /// Managers see everyone; employees only their own records.
    pub fn require_access_to(&self, employee_num: &str) -> Result<(), ApiError> {
        if self.is_manager() || self.employee_num.as_deref() == Some(employee_num) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Not your record".into()))
        }
    }

    pub fn own_employee_num(&self) -> Result<&str, ApiError> {
        self.employee_num
            .as_deref()
            .ok_or_else(|| ApiError::Forbidden("No employee profile".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, num: Option<&str>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            employee_num: num.map(String::from),
        }
    }

    #[test]
    fn employees_only_reach_their_own_records() {
        let emp = user(Role::Employee, Some("E1"));
        assert!(emp.require_access_to("E1").is_ok());
        assert!(emp.require_access_to("E2").is_err());
        assert!(emp.require_manager().is_err());
    }

    #[test]
    fn managers_reach_everyone() {
        let mgr = user(Role::Manager, None);
        assert!(mgr.require_access_to("E2").is_ok());
        assert!(mgr.require_manager().is_ok());
        assert!(mgr.require_admin().is_err());
        assert!(mgr.own_employee_num().is_err());
    }
}
