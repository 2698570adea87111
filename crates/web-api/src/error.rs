use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// 对外输出的 HTTP 错误，响应体统一为 `{"error": <message>}`。
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::UsernameTaken => ApiError::conflict("username taken"),
            ApplicationError::InvalidCredentials => ApiError::unauthorized("invalid credentials"),
            ApplicationError::InvalidRefreshToken => {
                ApiError::unauthorized("invalid refresh token")
            }
            ApplicationError::RoomNotFound => ApiError::not_found("room not found"),
            ApplicationError::UserNotFound => ApiError::not_found("user not found"),
            ApplicationError::Token(err) => {
                tracing::error!(error = %err, "token generation");
                ApiError::internal("internal error")
            }
            ApplicationError::Password(err) => {
                tracing::error!(error = %err, "password hashing");
                ApiError::internal("internal error")
            }
            ApplicationError::Repository(err) => {
                tracing::error!(error = %err, "storage");
                ApiError::internal("internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
