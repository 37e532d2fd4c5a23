use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        cookies::{cleared_headers, get_cookie, session_headers, REFRESH_COOKIE},
        dto::{
            ChangePasswordRequest, LoginRequest, MessageResponse, RefreshRequest, SessionResponse,
            UserResponse,
        },
        extractors::AuthUser,
        services::{LoginInput, RegisterInput},
    },
    errors::AuthError,
    multipart::StagedForm,
    state::AppState,
};

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/register",
            post(register).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh))
        .route("/users/logout", post(logout))
        .route("/users/change-password", post(change_password))
}

/// POST /users/register (multipart: username, email, password, fullName, avatar, coverImage)
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<impl IntoResponse, AuthError> {
    let mut form = StagedForm::read(
        mp,
        &["avatar", "coverImage"],
        &state.config.media.staging_dir,
    )
    .await?;

    let input = RegisterInput {
        username: form.take_field("username").unwrap_or_default(),
        email: form.take_field("email").unwrap_or_default(),
        password: form.take_field("password").unwrap_or_default(),
        full_name: form.take_field("fullName"),
        avatar: form.take_file("avatar"),
        cover_image: form.take_file("coverImage"),
    };
    let user = state.sessions.register(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User registered successfully",
            user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let session = state
        .sessions
        .login(LoginInput {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let headers = session_headers(&session.tokens, state.sessions.keys())?;
    Ok((headers, Json(SessionResponse::new("Login successful", session))))
}

/// POST /users/refresh-token; token from the `refreshToken` cookie or the body.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let from_body = body.and_then(|Json(b)| b.refresh_token);
    let presented = get_cookie(&headers, REFRESH_COOKIE)
        .map(str::to_string)
        .or(from_body);

    let session = state.sessions.refresh(presented.as_deref()).await?;

    let headers = session_headers(&session.tokens, state.sessions.keys())?;
    Ok((
        headers,
        Json(SessionResponse::new("Access token refreshed", session)),
    ))
}

#[instrument(skip(state, claims), fields(user_id = claims.id))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AuthError> {
    state.sessions.logout(claims.id).await?;
    Ok((
        cleared_headers(),
        Json(MessageResponse {
            message: "Logout successful",
        }),
    ))
}

#[instrument(skip(state, claims, payload), fields(user_id = claims.id))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state
        .sessions
        .change_password(claims.id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password changed successfully",
    }))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;

    const BOUNDARY: &str = "accountd-form-boundary";

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn text_part(body: &mut Vec<u8>, name: &str, value: &str) {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    fn file_part(body: &mut Vec<u8>, name: &str, content: &[u8]) {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{name}.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }

    fn account_fields(body: &mut Vec<u8>, username: &str) {
        text_part(body, "username", username);
        text_part(body, "email", &format!("{username}@x.com"));
        text_part(body, "password", "secret1");
        text_part(body, "fullName", "Test User");
    }

    fn register_request(mut body: Vec<u8>, closed: bool) -> Request<Body> {
        if closed {
            body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        }
        Request::post("/api/v1/users/register")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn login_sets_cookies_and_hides_password() {
        let state = AppState::fake();
        state.seed_user("alice", "alice@x.com", "secret1").await;

        let res = login(
            State(state.clone()),
            Json(LoginRequest {
                username: Some("alice".into()),
                email: None,
                password: "secret1".into(),
            }),
        )
        .await
        .unwrap()
        .into_response();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get_all(header::SET_COOKIE).iter().count(), 2);
        let json = body_json(res).await;
        assert_eq!(json["user"]["username"], "alice");
        assert!(json["accessToken"].is_string());
        assert!(json["user"].get("password").is_none());
        assert!(json["user"].get("refreshToken").is_none());
    }

    #[tokio::test]
    async fn bad_password_and_unknown_user_answer_alike() {
        let state = AppState::fake();
        state.seed_user("bob", "bob@x.com", "secret1").await;

        let mut bodies = Vec::new();
        for username in ["bob", "nobody"] {
            let res = login(
                State(state.clone()),
                Json(LoginRequest {
                    username: Some(username.into()),
                    email: None,
                    password: "wrong-pass".into(),
                }),
            )
            .await
            .into_response();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            bodies.push(body_json(res).await);
        }
        assert_eq!(bodies[0], bodies[1]);
    }

    #[tokio::test]
    async fn refresh_reads_cookie_before_body() {
        let state = AppState::fake();
        state.seed_user("carol", "carol@x.com", "secret1").await;
        let session = state
            .sessions
            .login(LoginInput {
                username: Some("carol".into()),
                email: None,
                password: "secret1".into(),
            })
            .await
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("refreshToken={}", session.tokens.refresh_token)
                .parse()
                .unwrap(),
        );
        let body = Json(RefreshRequest {
            refresh_token: Some("stale.body.token".into()),
        });
        let res = refresh(State(state.clone()), headers, Some(body))
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::OK);

        let res = refresh(State(state), HeaderMap::new(), None)
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_clears_cookies() {
        let state = AppState::fake();
        let user = state.seed_user("dave", "dave@x.com", "secret1").await;
        let claims = crate::auth::claims::AccessClaims {
            id: user.id,
            email: user.email,
            username: user.username,
        };
        let res = logout(State(state), AuthUser(claims))
            .await
            .unwrap()
            .into_response();
        let cleared: Vec<_> = res
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cleared.len(), 2);
        assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn register_form_creates_user() {
        let state = AppState::fake();
        let staging = state.config.media.staging_dir.clone();

        let mut body = Vec::new();
        account_fields(&mut body, "zoe");
        file_part(&mut body, "avatar", b"\x89PNG avatar");
        file_part(&mut body, "coverImage", b"\x89PNG cover");
        let res = build_app(state.clone())
            .oneshot(register_request(body, true))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::CREATED);
        let json = body_json(res).await;
        assert_eq!(json["user"]["username"], "zoe");
        assert_eq!(json["user"]["fullName"], "Test User");
        assert!(json["user"]["avatar"]
            .as_str()
            .unwrap()
            .starts_with("https://media.local/avatars/"));
        assert!(json["user"]["coverImage"].as_str().unwrap().contains("/covers/"));
        assert!(json["user"].get("password").is_none());
        assert_eq!(staged_files(&staging), 0);
    }

    #[tokio::test]
    async fn empty_avatar_part_is_treated_as_missing() {
        let state = AppState::fake();

        let mut body = Vec::new();
        account_fields(&mut body, "yara");
        file_part(&mut body, "avatar", b"");
        let res = build_app(state)
            .oneshot(register_request(body, true))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Avatar image is required");
    }

    #[tokio::test]
    async fn truncated_form_removes_staged_files() {
        let state = AppState::fake();
        let staging = state.config.media.staging_dir.clone();

        let mut body = Vec::new();
        file_part(&mut body, "avatar", b"\x89PNG avatar");
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"username\"\r\n\r\nxa"
            )
            .as_bytes(),
        );
        let res = build_app(state.clone())
            .oneshot(register_request(body, false))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(staging.exists());
        assert_eq!(staged_files(&staging), 0);
        assert!(state.sessions.store().find_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_accepts_body_token_once() {
        let state = AppState::fake();
        state.seed_user("wren", "wren@x.com", "secret1").await;
        let session = state
            .sessions
            .login(LoginInput {
                username: Some("wren".into()),
                email: None,
                password: "secret1".into(),
            })
            .await
            .unwrap();

        let request = || {
            Request::post("/api/v1/users/refresh-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "refreshToken": session.tokens.refresh_token })
                        .to_string(),
                ))
                .unwrap()
        };

        let res = build_app(state.clone()).oneshot(request()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get_all(header::SET_COOKIE).iter().count(), 2);
        let json = body_json(res).await;
        assert_eq!(json["user"]["username"], "wren");
        assert_ne!(json["refreshToken"], session.tokens.refresh_token.as_str());

        let replay = build_app(state).oneshot(request()).await.unwrap();
        assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    }
}
