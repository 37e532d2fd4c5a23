use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity carried by an access token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub id: i64,
    pub email: String,
    pub username: String,
}

/// Payload of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub id: i64,
    pub jti: Uuid, // distinguishes tokens issued within the same second
}

impl RefreshClaims {
    pub fn fresh(id: i64) -> Self {
        Self {
            id,
            jti: Uuid::new_v4(),
        }
    }
}
