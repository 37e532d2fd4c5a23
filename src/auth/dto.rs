use serde::{Deserialize, Serialize};

use super::services::Session;

/// Request body for login. At least one identifier must be present.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

/// Optional body for token refresh; the cookie takes precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Response returned after login or refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse<U> {
    pub message: &'static str,
    pub access_token: String,
    pub refresh_token: String,
    pub user: U,
}

impl<U> SessionResponse<U> {
    pub fn new(message: &'static str, session: Session<U>) -> Self {
        Self {
            message,
            access_token: session.tokens.access_token,
            refresh_token: session.tokens.refresh_token,
            user: session.user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse<U> {
    pub message: &'static str,
    pub user: U,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
