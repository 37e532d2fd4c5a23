use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::{AccessClaims, RefreshClaims};
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token signing failed: {0}")]
    Signing(#[source] anyhow::Error),
}

/// Claims plus the registered timestamps every token carries.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<C> {
    #[serde(flatten)]
    claims: C,
    iat: i64,
    exp: i64,
}

/// Signs `claims` (HS256) with an expiry of `issued_at + ttl`.
///
/// Identical inputs produce identical tokens.
pub fn issue<C: Serialize>(
    claims: &C,
    key: &EncodingKey,
    ttl: Duration,
    issued_at: OffsetDateTime,
) -> Result<String, TokenError> {
    let envelope = Envelope {
        claims,
        iat: issued_at.unix_timestamp(),
        exp: (issued_at + ttl).unix_timestamp(),
    };
    encode(&Header::new(Algorithm::HS256), &envelope, key)
        .map_err(|e| TokenError::Signing(e.into()))
}

/// Checks signature and expiry, then returns the embedded claims.
pub fn verify<C: DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<C, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = decode::<Envelope<C>>(token, key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::InvalidSignature,
    })?;
    Ok(data.claims.claims)
}

/// Signing material for both token kinds. Each kind has its own secret and ttl.
#[derive(Clone)]
pub struct TokenKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(cfg: &JwtConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        Ok(Self {
            access_encoding: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            access_ttl: Duration::minutes(cfg.access_ttl_minutes),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes),
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access_token(&self, claims: &AccessClaims) -> Result<String, TokenError> {
        let token = issue(
            claims,
            &self.access_encoding,
            self.access_ttl,
            OffsetDateTime::now_utc(),
        )?;
        debug!(user_id = claims.id, "access token signed");
        Ok(token)
    }

    pub fn issue_refresh_token(&self, claims: &RefreshClaims) -> Result<String, TokenError> {
        let token = issue(
            claims,
            &self.refresh_encoding,
            self.refresh_ttl,
            OffsetDateTime::now_utc(),
        )?;
        debug!(user_id = claims.id, "refresh token signed");
        Ok(token)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(token, &self.access_decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        verify(token, &self.refresh_decoding)
    }
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

#[cfg(test)]
pub(crate) fn test_keys() -> TokenKeys {
    TokenKeys::new(&JwtConfig {
        access_secret: "test-access-secret".into(),
        refresh_secret: "test-refresh-secret".into(),
        access_ttl_minutes: 5,
        refresh_ttl_minutes: 60,
    })
    .expect("test keys are valid")
}
