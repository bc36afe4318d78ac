use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Request-terminal error for the HTTP surface. Every variant renders as a
/// JSON body of the shape `{"detail": <message>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Email already in use")]
    EmailInUse,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Password too short")]
    PasswordTooShort,
    #[error("Missing Authorization header")]
    MissingAuth,
    #[error("Invalid Authorization header")]
    InvalidAuthHeader,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("User not found")]
    UserNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::EmailInUse => StatusCode::CONFLICT,
            ApiError::InvalidCredentials
            | ApiError::MissingAuth
            | ApiError::InvalidAuthHeader
            | ApiError::InvalidToken
            | ApiError::UserNotFound => StatusCode::UNAUTHORIZED,
            ApiError::InvalidEmail | ApiError::PasswordTooShort => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details are logged, never sent to the client.
        let detail = match &self {
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
