use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::Role;
use crate::models::TokenType;

fn reject(req: ServiceRequest, message: &str) -> ServiceResponse<BoxBody> {
    let resp = ApiError::Unauthorized(message.to_string()).error_response();
    req.into_response(resp)
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let header_value = req
        .headers()
        .get("Authorization")
        .map(|h| h.to_str().map(str::to_owned));

    let header_value = match header_value {
        Some(Ok(v)) => v,
        Some(Err(_)) => {
            return Ok(reject(req, "Invalid Authorization header encoding"));
        }
        None => return Ok(reject(req, "Missing Authorization header")),
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t,
        None => {
            return Ok(reject(req, "Authorization header must start with Bearer"));
        }
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Token rejected");
            return Ok(reject(req, "Invalid or expired token"));
        }
    };

    if claims.token_type != TokenType::Access {
        return Ok(reject(req, "Access token required"));
    }

    let role = match Role::from_id(claims.role) {
        Some(role) => role,
        None => return Ok(reject(req, "Invalid role")),
    };

    tracing::debug!(user_id = claims.user_id, role = ?role, "Authenticated request");

    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_num: claims.employee_num,
    });

    next.call(req).await
}
