use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    auth::{
        repo::{UniqueViolation, UserStore},
        repo_types::PublicUser,
        validate,
    },
    errors::AuthError,
    storage::{MediaUploader, StagedFile},
};

/// Which profile image a staged upload replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileImage {
    Avatar,
    Cover,
}

impl ProfileImage {
    fn folder(self) -> &'static str {
        match self {
            Self::Avatar => "avatars",
            Self::Cover => "covers",
        }
    }
}

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn UserStore>,
    media: MediaUploader,
}

impl ProfileService {
    pub fn new(store: Arc<dyn UserStore>, media: MediaUploader) -> Self {
        Self { store, media }
    }

    #[instrument(skip(self))]
    pub async fn current_user(&self, user_id: i64) -> Result<PublicUser, AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::NotFound)?;
        Ok(PublicUser::from(&user))
    }

    #[instrument(skip(self, email, full_name))]
    pub async fn update_account(
        &self,
        user_id: i64,
        email: Option<String>,
        full_name: Option<String>,
    ) -> Result<PublicUser, AuthError> {
        let (Some(email), Some(full_name)) =
            (validate::non_blank(email), validate::non_blank(full_name))
        else {
            return Err(AuthError::validation("All fields are required"));
        };
        let email = validate::normalize_email(&email);
        validate::email(&email)?;

        if self
            .store
            .email_taken_by_other(&email, user_id)
            .await
            .map_err(AuthError::Store)?
        {
            return Err(AuthError::Conflict);
        }

        let user = match self.store.update_account(user_id, &email, &full_name).await {
            Ok(Some(u)) => u,
            Ok(None) => return Err(AuthError::NotFound),
            Err(e) if e.is::<UniqueViolation>() => return Err(AuthError::Conflict),
            Err(e) => return Err(AuthError::Store(e)),
        };
        info!(user_id, "account updated");
        Ok(PublicUser::from(&user))
    }

    /// Uploads `file` and points the user's avatar or cover at it.
    /// The staged file is removed when this returns.
    #[instrument(skip(self, file))]
    pub async fn replace_image(
        &self,
        user_id: i64,
        kind: ProfileImage,
        file: StagedFile,
    ) -> Result<PublicUser, AuthError> {
        let media = self
            .media
            .upload(&file, kind.folder())
            .await
            .map_err(AuthError::UploadFailure)?;

        let res = match kind {
            ProfileImage::Avatar => self.store.set_avatar(user_id, &media.secure_url).await,
            ProfileImage::Cover => self.store.set_cover_image(user_id, &media.secure_url).await,
        };
        let user = match res {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.media.discard(&media).await;
                return Err(AuthError::NotFound);
            }
            Err(e) => {
                self.media.discard(&media).await;
                return Err(AuthError::Store(e));
            }
        };

        info!(user_id, ?kind, "profile image updated");
        Ok(PublicUser::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::services::tests::{fixture, Fixture};

    fn profiles(fx: &Fixture) -> ProfileService {
        ProfileService::new(
            fx.store.clone(),
            MediaUploader::new(fx.media.clone(), Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn current_user_returns_public_view() {
        let fx = fixture();
        let user = fx.register("alice", "alice@x.com", "secret1").await;
        let me = profiles(&fx).current_user(user.id).await.unwrap();
        assert_eq!(me, user);

        let missing = profiles(&fx).current_user(user.id + 1).await;
        assert!(matches!(missing, Err(AuthError::NotFound)));
    }

    #[tokio::test]
    async fn update_account_requires_both_fields() {
        let fx = fixture();
        let user = fx.register("bob", "bob@x.com", "secret1").await;
        let res = profiles(&fx)
            .update_account(user.id, Some("bob@y.com".into()), None)
            .await;
        assert!(matches!(res, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn update_account_changes_email_and_name() {
        let fx = fixture();
        let user = fx.register("carol", "carol@x.com", "secret1").await;
        let updated = profiles(&fx)
            .update_account(user.id, Some("Carol@Y.com".into()), Some("Carol C".into()))
            .await
            .unwrap();
        assert_eq!(updated.email, "carol@y.com");
        assert_eq!(updated.full_name.as_deref(), Some("Carol C"));
    }

    #[tokio::test]
    async fn update_account_rejects_taken_email() {
        let fx = fixture();
        fx.register("dave", "dave@x.com", "secret1").await;
        let erin = fx.register("erin", "erin@x.com", "secret1").await;
        let res = profiles(&fx)
            .update_account(erin.id, Some("dave@x.com".into()), Some("Erin".into()))
            .await;
        assert!(matches!(res, Err(AuthError::Conflict)));
    }

    #[tokio::test]
    async fn replace_images_uploads_and_cleans_staging() {
        let fx = fixture();
        let user = fx.register("frank", "frank@x.com", "secret1").await;

        let (file, path) = fx.stage().await;
        let updated = profiles(&fx)
            .replace_image(user.id, ProfileImage::Cover, file)
            .await
            .unwrap();
        assert!(updated.cover_image.as_deref().unwrap().contains("/covers/"));
        assert!(!path.exists());

        let (file, _) = fx.stage().await;
        let updated = profiles(&fx)
            .replace_image(user.id, ProfileImage::Avatar, file)
            .await
            .unwrap();
        assert_ne!(updated.avatar, user.avatar);
    }

    #[tokio::test]
    async fn replace_image_for_missing_user_discards_upload() {
        let fx = fixture();
        let user = fx.register("gina", "gina@x.com", "secret1").await;

        let (file, path) = fx.stage().await;
        let err = profiles(&fx)
            .replace_image(user.id + 1, ProfileImage::Avatar, file)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
        assert!(!path.exists());

        let uploaded = fx.media.uploaded.lock().unwrap().last().cloned().unwrap();
        assert_eq!(*fx.media.deleted.lock().unwrap(), vec![uploaded.key]);
    }

    #[tokio::test]
    async fn replace_image_store_failure_discards_upload() {
        let fx = fixture();
        let user = fx.register("hank", "hank@x.com", "secret1").await;
        fx.store.fail_writes(true);

        let (file, _) = fx.stage().await;
        let err = profiles(&fx)
            .replace_image(user.id, ProfileImage::Cover, file)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));
        assert_eq!(fx.media.deleted.lock().unwrap().len(), 1);
    }
}
