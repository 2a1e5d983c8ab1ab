use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{header, HeaderMap};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use rusqlite::params;
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::access::login_redirect;
use crate::downloads::client_address;
use crate::error::{ApiError, AppError};
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
}

/// Extractor that requires authentication.
/// Returns 401 if no valid session found.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = extract_session_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        let user = conn
            .query_row(
                "SELECT u.id, u.username, u.is_staff FROM sessions s \
                 JOIN users u ON u.id = s.user_id \
                 WHERE s.token = ?1 AND s.expires_at > datetime('now')",
                params![token],
                |row| {
                    Ok(CurrentUser {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        is_staff: row.get(2)?,
                    })
                },
            )
            .map_err(|_| AppError::Unauthorized)?;

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// Optional user extractor, `None` instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }

    pub fn username(&self) -> Option<String> {
        self.0.as_ref().map(|u| u.username.clone())
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

/// Like `CurrentUser`, but HTML pages send anonymous visitors to the login
/// form and bring them back afterwards.
pub struct LoginRequired(pub CurrentUser);

impl FromRequestParts<AppState> for LoginRequired {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await {
            Ok(user) => Ok(LoginRequired(user)),
            Err(AppError::Unauthorized) => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(Redirect::to(&login_redirect(next)).into_response())
            }
            Err(other) => Err(other.into_response()),
        }
    }
}

/// `CurrentUser` for the REST API: rejections carry a JSON `detail` body.
pub struct ApiUser(pub CurrentUser);

impl FromRequestParts<AppState> for ApiUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state)
            .await
            .map(ApiUser)
            .map_err(ApiError)
    }
}

/// Source address of the request: last `X-Forwarded-For` hop, else the peer.
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip());

        client_address(forwarded, peer)
            .map(ClientAddr)
            .ok_or_else(|| AppError::Internal("Missing ConnectInfo extension".into()))
    }
}

pub fn extract_session_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_cookie(cookie: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header::COOKIE, cookie)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let parts = parts_with_cookie("theme=dark; portal_session=abc123; lang=de");
        assert_eq!(extract_session_token(&parts.headers, "portal_session"), Some("abc123"));
        assert_eq!(extract_session_token(&parts.headers, "other"), None);
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        let parts = parts_with_cookie("portal_session=");
        assert_eq!(extract_session_token(&parts.headers, "portal_session"), None);
    }
}
