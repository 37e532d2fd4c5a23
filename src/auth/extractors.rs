use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use super::{
    claims::AccessClaims,
    cookies::{get_cookie, ACCESS_COOKIE},
    jwt::TokenKeys,
};

/// Identity of the caller, taken from a valid access token.
///
/// The token is read from the `accessToken` cookie, falling back to
/// `Authorization: Bearer`.
pub struct AuthUser(pub AccessClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenKeys: FromRef<S>,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = get_cookie(&parts.headers, ACCESS_COOKIE).or_else(|| {
            parts
                .headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        });

        let Some(token) = token else {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Access token is missing" })),
            ));
        };

        let keys = TokenKeys::from_ref(state);
        match keys.verify_access(token) {
            Ok(claims) => Ok(AuthUser(claims)),
            Err(e) => {
                warn!(error = %e, "access token rejected");
                Err((
                    StatusCode::FORBIDDEN,
                    Json(json!({ "message": "Invalid or expired access token" })),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;
    use crate::auth::{claims::RefreshClaims, jwt::test_keys};

    fn parts(header: Option<(&str, String)>) -> Parts {
        let mut req = Request::builder().uri("/api/v1/users/user");
        if let Some((name, value)) = header {
            req = req.header(name, value);
        }
        req.body(()).unwrap().into_parts().0
    }

    fn claims() -> AccessClaims {
        AccessClaims {
            id: 3,
            email: "alice@x.com".into(),
            username: "alice".into(),
        }
    }

    #[tokio::test]
    async fn accepts_bearer_header() {
        let keys = test_keys();
        let token = keys.issue_access_token(&claims()).unwrap();
        let mut p = parts(Some(("authorization", format!("Bearer {token}"))));
        let AuthUser(got) = AuthUser::from_request_parts(&mut p, &keys).await.unwrap();
        assert_eq!(got, claims());
    }

    #[tokio::test]
    async fn accepts_cookie() {
        let keys = test_keys();
        let token = keys.issue_access_token(&claims()).unwrap();
        let mut p = parts(Some(("cookie", format!("accessToken={token}"))));
        assert!(AuthUser::from_request_parts(&mut p, &keys).await.is_ok());
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let keys = test_keys();
        let mut p = parts(None);
        let (status, _) = AuthUser::from_request_parts(&mut p, &keys)
            .await
            .err()
            .unwrap();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_is_forbidden_as_access() {
        let keys = test_keys();
        let token = keys.issue_refresh_token(&RefreshClaims::fresh(3)).unwrap();
        let mut p = parts(Some(("authorization", format!("Bearer {token}"))));
        let (status, _) = AuthUser::from_request_parts(&mut p, &keys)
            .await
            .err()
            .unwrap();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
