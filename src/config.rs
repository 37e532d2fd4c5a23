use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL under which uploaded objects are publicly served.
    pub public_url: String,
    pub upload_timeout_secs: u64,
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub media: MediaConfig,
    pub revoke_on_password_change: bool,
}

/// Reads `key`, using `default` only when the variable is unset.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, std::env::var(key).ok(), default)
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid {key}")),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            access_secret: std::env::var("ACCESS_TOKEN_SECRET")?,
            refresh_secret: std::env::var("REFRESH_TOKEN_SECRET")?,
            access_ttl_minutes: env_or("ACCESS_TOKEN_TTL_MINUTES", 15)?,
            refresh_ttl_minutes: env_or("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 7)?,
        };
        jwt.validate()?;

        let media = MediaConfig {
            endpoint: std::env::var("MEDIA_ENDPOINT")?,
            bucket: std::env::var("MEDIA_BUCKET")?,
            access_key: std::env::var("MEDIA_ACCESS_KEY")?,
            secret_key: std::env::var("MEDIA_SECRET_KEY")?,
            region: std::env::var("MEDIA_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_url: std::env::var("MEDIA_PUBLIC_URL")?,
            upload_timeout_secs: env_or("MEDIA_UPLOAD_TIMEOUT_SECS", 30)?,
            staging_dir: std::env::var("STAGING_DIR")
                .unwrap_or_else(|_| "./tmp/uploads".into())
                .into(),
        };

        Ok(Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            jwt,
            media,
            revoke_on_password_change: env_or("REVOKE_ON_PASSWORD_CHANGE", false)?,
        })
    }
}

impl JwtConfig {
    /// Rejects configurations that would let one token kind pass as the other.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.access_secret.is_empty(), "access token secret is empty");
        anyhow::ensure!(!self.refresh_secret.is_empty(), "refresh token secret is empty");
        anyhow::ensure!(
            self.access_secret != self.refresh_secret,
            "access and refresh token secrets must differ"
        );
        anyhow::ensure!(
            self.access_ttl_minutes > 0 && self.refresh_ttl_minutes > 0,
            "token ttl must be positive"
        );
        Ok(())
    }
}
