use axum::Json;
use axum::{
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::utils::TokenError;

/// 面向客户端的错误。所有错误都渲染为 `{"message": ...}`
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unsupported authorization scheme")]
    UnknownScheme,
    #[error("Malformed session token: {0}")]
    MalformedToken(String),
    #[error("Invalid session token: {0}")]
    RejectedToken(String),
    #[error("Session expired or revoked, please log in again")]
    SessionRevoked,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("This account has been disabled")]
    AccountDisabled,
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("User {0} not found")]
    UserNotFound(String),
    #[error("Too many requests from {ip}, retry in {retry_after} seconds")]
    RateLimited { ip: String, retry_after: i64 },
    #[error("Internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<i64>,
}

impl AppError {
    /// 记录内部错误的细节，客户端只看到通用信息
    pub fn internal(context: &str, error: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, error);
        AppError::Internal
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UnknownScheme | AppError::MalformedToken(_) => StatusCode::NOT_ACCEPTABLE,
            AppError::RejectedToken(_) => StatusCode::BAD_REQUEST,
            AppError::SessionRevoked | AppError::Unauthorized | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AccountDisabled | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UserNotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for AppError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Malformed(e) => AppError::MalformedToken(e.to_string()),
            TokenError::Rejected(e) => AppError::RejectedToken(e.to_string()),
            TokenError::Signing(e) => AppError::internal("Unable to sign token", e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            AppError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        };

        let body = Json(ErrorResponse {
            message: self.to_string(),
            retry_after,
        });

        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
