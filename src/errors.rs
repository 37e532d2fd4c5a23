use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::auth::jwt::TokenError;

/// Failure taxonomy of the account service.
///
/// Variants stay distinct internally and in logs; `into_response` collapses the
/// authentication failures so callers cannot tell which credential was wrong.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("username or email already exists")]
    Conflict,
    #[error("avatar image is required")]
    MissingAvatar,
    #[error("media upload failed: {0}")]
    UploadFailure(#[source] anyhow::Error),
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("refresh token is missing")]
    MissingToken,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token does not belong to a known user")]
    InvalidToken,
    #[error("refresh token was rotated out or revoked")]
    TokenMismatch,
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MissingAvatar | Self::MissingToken => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict => StatusCode::CONFLICT,
            Self::NotFound
            | Self::InvalidCredentials
            | Self::InvalidSignature
            | Self::Expired
            | Self::InvalidToken
            | Self::TokenMismatch => StatusCode::UNAUTHORIZED,
            Self::UploadFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound | Self::InvalidCredentials => "Invalid credentials".into(),
            Self::InvalidSignature | Self::Expired | Self::InvalidToken => {
                "Invalid or expired refresh token".into()
            }
            Self::TokenMismatch => "Refresh token either expired or used".into(),
            Self::UploadFailure(_) => "Failed to upload image".into(),
            Self::Store(_) | Self::Internal(_) => "Internal server error".into(),
            Self::Conflict => "Username or email already exists".into(),
            Self::MissingAvatar => "Avatar image is required".into(),
            Self::MissingToken => "Refresh token is missing".into(),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => Self::Expired,
            TokenError::InvalidSignature => Self::InvalidSignature,
            TokenError::Signing(e) => Self::Internal(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        } else {
            warn!(error = %self, %status, "request rejected");
        }
        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}
