use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::{AccessClaims, RefreshClaims},
        jwt::TokenKeys,
        password::{hash_password, verify_password},
        repo::{UniqueViolation, UserStore},
        repo_types::{NewUser, PublicUser, User, UserSummary},
        validate,
    },
    errors::AuthError,
    storage::{MediaUploader, StagedFile, UploadedMedia},
};

/// Knobs that change session semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionPolicy {
    /// Clear the stored refresh token after a successful password change.
    pub revoke_on_password_change: bool,
}

pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub avatar: Option<StagedFile>,
    pub cover_image: Option<StagedFile>,
}

pub struct LoginInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Tokens handed back to the HTTP layer together with a user view.
#[derive(Debug, Clone)]
pub struct Session<U> {
    pub tokens: IssuedTokens,
    pub user: U,
}

/// Drives register, login, refresh, logout and password change.
///
/// At most one refresh token per user is valid: the one currently stored.
/// Login and refresh overwrite it, logout clears it.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn UserStore>,
    media: MediaUploader,
    keys: TokenKeys,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn UserStore>,
        media: MediaUploader,
        keys: TokenKeys,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            store,
            media,
            keys,
            policy,
        }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Creates an account. Staged files are removed when this returns.
    #[instrument(skip_all, fields(username = %input.username))]
    pub async fn register(&self, input: RegisterInput) -> Result<PublicUser, AuthError> {
        let RegisterInput {
            username,
            email,
            password,
            full_name,
            avatar,
            cover_image,
        } = input;

        let username = validate::normalize_username(&username);
        let email = validate::normalize_email(&email);
        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AuthError::validation(
                "Username, email, and password are required",
            ));
        }
        validate::username(&username)?;
        validate::password(&password)?;
        validate::email(&email)?;

        if self
            .store
            .username_or_email_exists(&username, &email)
            .await
            .map_err(AuthError::Store)?
        {
            return Err(AuthError::Conflict);
        }

        let avatar = avatar.ok_or(AuthError::MissingAvatar)?;
        let uploaded_avatar = self
            .media
            .upload(&avatar, "avatars")
            .await
            .map_err(AuthError::UploadFailure)?;
        let mut uploaded = vec![uploaded_avatar.clone()];

        let uploaded_cover = match &cover_image {
            Some(file) => match self.media.upload(file, "covers").await {
                Ok(media) => {
                    uploaded.push(media.clone());
                    Some(media)
                }
                Err(e) => {
                    self.discard(&uploaded).await;
                    return Err(AuthError::UploadFailure(e));
                }
            },
            None => None,
        };

        let password_hash = match hash_password(&password) {
            Ok(h) => h,
            Err(e) => {
                self.discard(&uploaded).await;
                return Err(AuthError::Internal(e));
            }
        };

        let new_user = NewUser {
            username,
            email,
            password_hash,
            full_name: validate::non_blank(full_name),
            avatar: uploaded_avatar.secure_url,
            cover_image: uploaded_cover.map(|m| m.secure_url),
        };
        let user = match self.store.insert(&new_user).await {
            Ok(u) => u,
            Err(e) => {
                self.discard(&uploaded).await;
                return Err(if e.is::<UniqueViolation>() {
                    AuthError::Conflict
                } else {
                    AuthError::Store(e)
                });
            }
        };

        info!(user_id = user.id, "user registered");
        Ok(PublicUser::from(&user))
    }

    /// Authenticates by username or email and starts a new session.
    ///
    /// Any previously stored refresh token stops working.
    #[instrument(skip_all)]
    pub async fn login(&self, input: LoginInput) -> Result<Session<PublicUser>, AuthError> {
        let username =
            validate::non_blank(input.username).map(|u| validate::normalize_username(&u));
        let email = validate::non_blank(input.email).map(|e| validate::normalize_email(&e));
        if username.is_none() && email.is_none() {
            return Err(AuthError::validation("Email or username is required"));
        }
        if input.password.is_empty() {
            return Err(AuthError::validation("Password is required"));
        }

        let user = self
            .store
            .find_by_login(username.as_deref(), email.as_deref())
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::NotFound)?;

        let ok = verify_password(&input.password, &user.password).map_err(AuthError::Internal)?;
        if !ok {
            warn!(user_id = user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.start_session(&user).await?;
        info!(user_id = user.id, "user logged in");
        Ok(Session {
            tokens,
            user: PublicUser::from(&user),
        })
    }

    /// Exchanges the current refresh token for a new pair (rotation).
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        presented: Option<&str>,
    ) -> Result<Session<UserSummary>, AuthError> {
        let token = presented
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let claims = self.keys.verify_refresh(token)?;

        let user = self
            .store
            .find_by_id(claims.id)
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::InvalidToken)?;

        if user.refresh_token.is_empty() || user.refresh_token != token {
            warn!(user_id = user.id, "refresh token mismatch");
            return Err(AuthError::TokenMismatch);
        }

        let tokens = self.start_session(&user).await?;
        info!(user_id = user.id, "refresh token rotated");
        Ok(Session {
            tokens,
            user: UserSummary::from(&user),
        })
    }

    /// Revokes the stored refresh token. Calling it twice is fine.
    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: i64) -> Result<(), AuthError> {
        self.store
            .set_refresh_token(user_id, "")
            .await
            .map_err(AuthError::Store)?;
        info!(user_id, "user logged out");
        Ok(())
    }

    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if old_password.is_empty() || new_password.is_empty() {
            return Err(AuthError::validation(
                "Old and new password are required",
            ));
        }
        validate::password(new_password)?;

        let user = self
            .store
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::NotFound)?;

        if !verify_password(old_password, &user.password).map_err(AuthError::Internal)? {
            return Err(AuthError::InvalidCredentials);
        }

        let hash = hash_password(new_password).map_err(AuthError::Internal)?;
        self.store
            .set_password(user_id, &hash)
            .await
            .map_err(AuthError::Store)?;

        if self.policy.revoke_on_password_change {
            self.store
                .set_refresh_token(user_id, "")
                .await
                .map_err(AuthError::Store)?;
            info!(user_id, "password changed, session revoked");
        } else {
            info!(user_id, "password changed");
        }
        Ok(())
    }

    /// Signs a fresh pair and persists the refresh half.
    async fn start_session(&self, user: &User) -> Result<IssuedTokens, AuthError> {
        let access_token = self.keys.issue_access_token(&AccessClaims {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
        })?;
        let refresh_token = self
            .keys
            .issue_refresh_token(&RefreshClaims::fresh(user.id))?;

        self.store
            .set_refresh_token(user.id, &refresh_token)
            .await
            .map_err(AuthError::Store)?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    async fn discard(&self, uploaded: &[UploadedMedia]) {
        for media in uploaded {
            self.media.discard(media).await;
        }
    }
}
