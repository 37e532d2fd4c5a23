use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::{NewUser, User};

const USER_COLUMNS: &str = "id, username, email, password, full_name, avatar, cover_image, \
                            refresh_token, created_at, updated_at";

/// Raised by [`UserStore::insert`] when username or email is already taken.
#[derive(Debug, thiserror::Error)]
#[error("unique constraint violated")]
pub struct UniqueViolation;

/// Narrow persistence interface the services depend on.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;
    /// Matches on username OR email; `None` arguments never match.
    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>>;
    async fn username_or_email_exists(&self, username: &str, email: &str) -> anyhow::Result<bool>;
    async fn email_taken_by_other(&self, email: &str, user_id: i64) -> anyhow::Result<bool>;
    async fn insert(&self, new: &NewUser) -> anyhow::Result<User>;
    async fn set_refresh_token(&self, user_id: i64, token: &str) -> anyhow::Result<()>;
    async fn set_password(&self, user_id: i64, password_hash: &str) -> anyhow::Result<()>;
    async fn update_account(
        &self,
        user_id: i64,
        email: &str,
        full_name: &str,
    ) -> anyhow::Result<Option<User>>;
    /// `None` when no row has `user_id`.
    async fn set_avatar(&self, user_id: i64, url: &str) -> anyhow::Result<Option<User>>;
    async fn set_cover_image(&self, user_id: i64, url: &str) -> anyhow::Result<Option<User>>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select user by id")?;
        Ok(user)
    }

    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 \
             ORDER BY id LIMIT 1"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("select user by login")?;
        Ok(user)
    }

    async fn username_or_email_exists(&self, username: &str, email: &str) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)"#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.db)
        .await
        .context("check username/email uniqueness")?;
        Ok(exists)
    }

    async fn email_taken_by_other(&self, email: &str, user_id: i64) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND id <> $2)"#,
        )
        .bind(email)
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .context("check email uniqueness")?;
        Ok(exists)
    }

    async fn insert(&self, new: &NewUser) -> anyhow::Result<User> {
        let res = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users \
             (username, email, password, full_name, avatar, cover_image, refresh_token) \
             VALUES ($1, $2, $3, $4, $5, $6, '') \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.full_name)
        .bind(&new.avatar)
        .bind(&new.cover_image)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(UniqueViolation.into()),
            Err(e) => Err(anyhow::Error::new(e).context("insert user")),
        }
    }

    async fn set_refresh_token(&self, user_id: i64, token: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE users SET refresh_token = $1, updated_at = now() WHERE id = $2"#,
        )
        .bind(token)
        .bind(user_id)
        .execute(&self.db)
        .await
        .context("update refresh token")?;
        Ok(())
    }

    async fn set_password(&self, user_id: i64, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET password = $1, updated_at = now() WHERE id = $2"#)
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("update password")?;
        Ok(())
    }

    async fn update_account(
        &self,
        user_id: i64,
        email: &str,
        full_name: &str,
    ) -> anyhow::Result<Option<User>> {
        let res = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email = $1, full_name = $2, updated_at = now() \
             WHERE id = $3 RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(full_name)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(UniqueViolation.into()),
            Err(e) => Err(anyhow::Error::new(e).context("update account")),
        }
    }

    async fn set_avatar(&self, user_id: i64, url: &str) -> anyhow::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET avatar = $1, updated_at = now() \
             WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(url)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("update avatar")
    }

    async fn set_cover_image(&self, user_id: i64, url: &str) -> anyhow::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET cover_image = $1, updated_at = now() \
             WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(url)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("update cover image")
    }
}
