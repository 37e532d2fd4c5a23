use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::services::ProfileImage;
use crate::{
    auth::{dto::UserResponse, extractors::AuthUser, repo_types::PublicUser},
    errors::AuthError,
    multipart::StagedForm,
    state::AppState,
};

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/users/user", get(current_user))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/users/update-account", patch(update_account))
        .route("/users/update-avatar", patch(update_avatar))
        .route("/users/update-cover-image", patch(update_cover_image))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}

type UserJson = Json<UserResponse<PublicUser>>;

#[instrument(skip(state, claims), fields(user_id = claims.id))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<UserJson, AuthError> {
    let user = state.profiles.current_user(claims.id).await?;
    Ok(Json(UserResponse {
        message: "Current user fetched",
        user,
    }))
}

#[instrument(skip(state, claims, payload), fields(user_id = claims.id))]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<UserJson, AuthError> {
    let user = state
        .profiles
        .update_account(claims.id, payload.email, payload.full_name)
        .await?;
    Ok(Json(UserResponse {
        message: "Account updated",
        user,
    }))
}

#[instrument(skip(state, claims, mp), fields(user_id = claims.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    mp: Multipart,
) -> Result<UserJson, AuthError> {
    replace_image(state, claims.id, ProfileImage::Avatar, "avatar", mp).await
}

#[instrument(skip(state, claims, mp), fields(user_id = claims.id))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    mp: Multipart,
) -> Result<UserJson, AuthError> {
    replace_image(state, claims.id, ProfileImage::Cover, "coverImage", mp).await
}

async fn replace_image(
    state: AppState,
    user_id: i64,
    kind: ProfileImage,
    field: &str,
    mp: Multipart,
) -> Result<UserJson, AuthError> {
    let mut form = StagedForm::read(mp, &[field], &state.config.media.staging_dir).await?;
    let file = form
        .take_file(field)
        .ok_or_else(|| AuthError::validation(format!("{field} file is required")))?;
    let user = state.profiles.replace_image(user_id, kind, file).await?;
    Ok(Json(UserResponse {
        message: match kind {
            ProfileImage::Avatar => "Avatar updated successfully",
            ProfileImage::Cover => "Cover image updated successfully",
        },
        user,
    }))
}
