use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::fiscal::FiscalError;

/// Error type returned by every handler.
///
/// Internal failures are logged where they happen and rendered without detail.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    BadRequest(String),

    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{}", _0)]
    NotFound(String),

    #[display(fmt = "{}", _0)]
    Conflict(String),

    #[display(
        fmt = "Insufficient leave balance: requested {} days, {} available",
        requested,
        available
    )]
    InsufficientBalance { requested: f64, available: f64 },

    #[display(fmt = "Internal Server Error")]
    Internal,
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "INVALID_INPUT",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ApiError::Internal => "INTERNAL",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "code": self.code(),
            "message": self.to_string(),
        }))
    }
}

impl From<FiscalError> for ApiError {
    fn from(err: FiscalError) -> Self {
        match err {
            FiscalError::InvalidInput(msg) => ApiError::BadRequest(msg),
            FiscalError::InsufficientBalance {
                requested,
                available,
            } => ApiError::InsufficientBalance {
                requested,
                available,
            },
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // 23000: integrity constraint violation (duplicate key)
            if db_err.code().as_deref() == Some("23000") {
                return ApiError::Conflict("Record already exists".into());
            }
        }
        tracing::error!(error = %err, "Database error");
        ApiError::Internal
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "Unhandled error");
        ApiError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn fiscal_errors_map_to_client_errors() {
        let err: ApiError = FiscalError::InvalidInput("bad date".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ApiError = FiscalError::InsufficientBalance {
            requested: 3.0,
            available: 1.5,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.to_string(),
            "Insufficient leave balance: requested 3 days, 1.5 available"
        );
    }

    #[actix_web::test]
    async fn internal_errors_are_masked() {
        let err: ApiError = anyhow::anyhow!("connection refused on 10.0.0.3").into();
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["message"], "Internal Server Error");
        assert_eq!(value["code"], "INTERNAL");
    }
}
