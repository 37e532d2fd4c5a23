use axum::http::{header, HeaderMap, HeaderValue};
use time::Duration;

use super::{jwt::TokenKeys, services::IssuedTokens};
use crate::errors::AuthError;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

fn cookie(name: &str, value: &str, max_age: Duration) -> Result<HeaderValue, AuthError> {
    HeaderValue::try_from(format!(
        "{name}={value}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Strict",
        max_age.whole_seconds()
    ))
    .map_err(|e| AuthError::Internal(e.into()))
}

/// `Set-Cookie` headers delivering both tokens.
pub fn session_headers(tokens: &IssuedTokens, keys: &TokenKeys) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        cookie(ACCESS_COOKIE, &tokens.access_token, keys.access_ttl())?,
    );
    headers.append(
        header::SET_COOKIE,
        cookie(REFRESH_COOKIE, &tokens.refresh_token, keys.refresh_ttl())?,
    );
    Ok(headers)
}

/// `Set-Cookie` headers that make the client drop both tokens.
pub fn cleared_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_static(concat!(
            "accessToken=; Path=/; Max-Age=0; ",
            "HttpOnly; Secure; SameSite=Strict"
        )),
    );
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_static(concat!(
            "refreshToken=; Path=/; Max-Age=0; ",
            "HttpOnly; Secure; SameSite=Strict"
        )),
    );
    headers
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}
