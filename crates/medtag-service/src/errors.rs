use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::error::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Tag exists but is revoked, lost or replaced.
    #[error("Tag inactive: {0}")]
    TagInactive(String),

    #[error("Too many requests: {message}")]
    TooManyRequests {
        retry_after_seconds: i64,
        message: String,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Database(_) | ApiError::Crypto(_) | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::InvalidCredentials | ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TagInactive(_) => StatusCode::GONE,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (code, message) = match &self {
            ApiError::Database(detail) => {
                tracing::error!(target: "medtag.errors", error = %detail, "Database error");
                ("DATABASE_ERROR", "An internal database error occurred".to_string())
            }
            ApiError::Crypto(detail) => {
                tracing::error!(target: "medtag.errors", error = %detail, "Cryptographic error");
                (
                    "CRYPTO_ERROR",
                    "An internal cryptographic error occurred".to_string(),
                )
            }
            ApiError::InvalidCredentials => (
                "INVALID_CREDENTIALS",
                "Invalid email or password".to_string(),
            ),
            ApiError::InvalidToken(reason) => ("INVALID_TOKEN", reason.clone()),
            ApiError::Forbidden(reason) => ("FORBIDDEN", reason.clone()),
            ApiError::NotFound(what) => ("NOT_FOUND", what.clone()),
            ApiError::BadRequest(reason) => ("BAD_REQUEST", reason.clone()),
            ApiError::Conflict(reason) => ("CONFLICT", reason.clone()),
            ApiError::TagInactive(reason) => ("TAG_INACTIVE", reason.clone()),
            ApiError::TooManyRequests { message, .. } => ("RATE_LIMIT_EXCEEDED", message.clone()),
            ApiError::ServiceUnavailable(reason) => ("SERVICE_UNAVAILABLE", reason.clone()),
            ApiError::Internal => ("INTERNAL_ERROR", "An internal error occurred".to_string()),
        };

        let mut response = (status, Json(ErrorBody::new(code, message))).into_response();

        if let ApiError::InvalidToken(_) = &self {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"medtag\""),
            );
        }

        if let ApiError::TooManyRequests {
            retry_after_seconds,
            ..
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
