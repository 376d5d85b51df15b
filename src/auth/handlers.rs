use actix_web::{HttpRequest, HttpResponse, get, web};
use serde::Serialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    auth::{
        auth::AuthUser,
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::{role::Role, user::User},
    models::{Claims, LoginReq, RegisterReq, TokenPair, TokenType},
    store::users,
};

const MIN_PASSWORD_LEN: usize = 8;

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".into())
}

fn subject_of(user: &User) -> TokenSubject {
    TokenSubject {
        user_id: user.id,
        username: user.username.clone(),
        role: user.role_id,
        employee_num: user.employee_num.clone(),
    }
}

fn token_error(e: jsonwebtoken::errors::Error) -> ApiError {
    tracing::error!(error = %e, "Failed to sign token");
    ApiError::Internal
}

/// Issues an access/refresh pair and records the refresh token.
async fn issue_pair(pool: &MySqlPool, config: &Config, subject: &TokenSubject) -> ApiResult<TokenPair> {
    let access_token =
        generate_access_token(subject, &config.jwt_secret, config.access_token_ttl).map_err(token_error)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl).map_err(token_error)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");
    users::store_refresh(pool, subject.user_id, &refresh_claims.jti, refresh_claims.exp).await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

fn bearer_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))?;
    verify_token(token, &config.jwt_secret).ok()
}

#[derive(Serialize, ToSchema)]
pub struct Registered {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "tanaka")]
    pub username: String,
    pub role: Role,
}

/// The first account becomes the administrator; later accounts are employees
/// until an admin promotes them.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = Registered),
        (status = 400, description = "Invalid username or password"),
        (status = 409, description = "Username already taken")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(pool, payload), fields(username = %payload.username))]
pub async fn register(payload: web::Json<RegisterReq>, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let username = payload.username.trim().to_lowercase();
    if username.is_empty() || username.len() > 64 {
        return Err(ApiError::BadRequest("Username must be 1-64 characters".into()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let employee_num = payload
        .employee_num
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let hashed = hash_password(&payload.password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    let mut tx = pool.begin().await?;
    let role = if users::count(&mut *tx).await? == 0 {
        Role::Admin
    } else {
        Role::Employee
    };
    let id = users::insert(&mut *tx, &username, &hashed, role.id(), employee_num)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict("Username already taken".into()),
            other => other,
        })?;
    tx.commit().await?;

    info!(user_id = id, ?role, "User registered");
    Ok(HttpResponse::Created().json(Registered { id, username, role }))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(pool, config, payload), fields(username = %payload.username))]
pub async fn login(
    payload: web::Json<LoginReq>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    let username = payload.username.trim().to_lowercase();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest("Username or password required".into()));
    }

    let Some(user) = users::find_by_username(pool.get_ref(), &username).await? else {
        info!("Invalid credentials: user not found");
        return Err(invalid_credentials());
    };

    if let Err(e) = verify_password(&payload.password, &user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(invalid_credentials());
    }
    if !user.is_active {
        info!(user_id = user.id, "Login refused: account disabled");
        return Err(invalid_credentials());
    }

    let pair = issue_pair(pool.get_ref(), &config, &subject_of(&user)).await?;

    // a failed timestamp update does not fail the login
    if let Err(e) = users::touch_login(pool.get_ref(), user.id).await {
        warn!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = user.id, "Login successful");
    Ok(HttpResponse::Ok().json(pair))
}

/// Rotates a refresh token: the presented one is revoked and a new pair issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token missing, expired or revoked")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip(req, pool, config))]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let claims = bearer_claims(&req, &config)
        .filter(|c| c.token_type == TokenType::Refresh)
        .ok_or_else(|| ApiError::Unauthorized("Refresh token required".into()))?;

    let mut tx = pool.begin().await?;
    let record = users::lock_refresh(&mut *tx, &claims.jti)
        .await?
        .filter(|r| !r.revoked && r.user_id == claims.user_id)
        .ok_or_else(|| {
            warn!(user_id = claims.user_id, jti = %claims.jti, "Refresh with unknown or revoked token");
            ApiError::Unauthorized("Refresh token revoked".into())
        })?;
    users::revoke_refresh(&mut *tx, &claims.jti).await?;
    tx.commit().await?;

    // role or link may have changed since the token was issued
    let user = users::find(pool.get_ref(), record.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::Unauthorized("Account disabled".into()))?;

    let pair = issue_pair(pool.get_ref(), &config, &subject_of(&user)).await?;
    debug!(user_id = user.id, "Refresh token rotated");
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
) -> ApiResult<HttpResponse> {
    if let Some(claims) = bearer_claims(&req, &config).filter(|c| c.token_type == TokenType::Refresh) {
        let revoked = users::revoke_refresh(pool.get_ref(), &claims.jti).await?;
        debug!(user_id = claims.user_id, revoked, "Logout");
    }
    Ok(HttpResponse::NoContent().finish())
}

/// Identity carried by the caller's access token.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current user", body = Object, example = json!({
            "user_id": 3, "username": "tanaka", "role": "Employee", "employee_num": "E1024"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[get("/me")]
pub async fn me(auth: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "user_id": auth.user_id,
        "username": auth.username,
        "role": auth.role,
        "employee_num": auth.employee_num,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};

    fn token_for(config: &Config, role: Role, token_type: TokenType) -> String {
        let subject = TokenSubject {
            user_id: 9,
            username: "kato".into(),
            role: role.id(),
            employee_num: Some("E9".into()),
        };
        match token_type {
            TokenType::Access => generate_access_token(&subject, &config.jwt_secret, 60).unwrap(),
            TokenType::Refresh => generate_refresh_token(&subject, &config.jwt_secret, 60).unwrap().0,
        }
    }

    #[actix_web::test]
    async fn me_echoes_token_identity() {
        let config = Config::for_tests();
        let token = token_for(&config, Role::Manager, TokenType::Access);
        let app = test::init_service(App::new().app_data(web::Data::new(config)).service(me)).await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["username"], "kato");
        assert_eq!(body["role"], "Manager");
        assert_eq!(body["employee_num"], "E9");
    }

    #[actix_web::test]
    async fn refresh_tokens_do_not_authenticate_requests() {
        let config = Config::for_tests();
        let token = token_for(&config, Role::Admin, TokenType::Refresh);
        let app = test::init_service(App::new().app_data(web::Data::new(config)).service(me)).await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
