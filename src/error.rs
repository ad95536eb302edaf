use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-boundary error taxonomy. Every handler returns this; the
/// `IntoResponse` impl turns it into structured JSON.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid credentials on a protected route.
    #[error("{0}")]
    Unauthorized(String),

    /// A request field failed validation.
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Row absent or owned by another user.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Anything the client cannot fix.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str) -> Self {
        ApiError::NotFound(resource)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Database errors are categorized at the boundary: a unique violation on the
/// users email index is the client's mistake, a missing row is a 404,
/// everything else is internal.
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ApiError::NotFound("resource"),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                if db_err.constraint().is_some_and(|c| c.contains("email")) {
                    ApiError::validation("email", "user with this email already exists")
                } else {
                    ApiError::Internal(anyhow::Error::from(err))
                }
            }
            _ => ApiError::Internal(anyhow::Error::from(err)),
        }
    }
}

impl ApiError {
    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Validation { field, message } => {
                let mut errors = serde_json::Map::new();
                errors.insert((*field).to_string(), json!([message]));
                json!({ "errors": errors })
            }
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                json!({ "detail": "internal server error" })
            }
            other => json!({ "detail": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_per_variant() {
        assert_eq!(
            ApiError::unauthorized("no token").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::validation("name", "may not be blank").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("Recipe").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_body_is_field_keyed() {
        let body = ApiError::validation("password", "too short").body();
        assert_eq!(body["errors"]["password"][0], "too short");
    }

    #[test]
    fn internal_body_does_not_leak_details() {
        let body = ApiError::Internal(anyhow::anyhow!("connection refused on 10.0.0.3")).body();
        assert_eq!(body["detail"], "internal server error");
    }
}
