//! Session endpoints and cookie handling.
//!
//! The cookie payload is a plain random identifier, not a signed token;
//! all session state lives server-side, so revocation is immediate.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::error::AuthError;
use super::principal::{require_auth, require_session_auth};
use super::state::{AuthConfig, AuthState};
use super::types::SessionResponse;

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Request is authenticated", body = SessionResponse),
        (status = 204, description = "No usable credential")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Missing or invalid credentials answer 204 to avoid leaking auth state.
    match require_auth(&headers, &state).await {
        Ok(ctx) => (StatusCode::OK, Json(SessionResponse::from(&ctx.principal))).into_response(),
        Err(AuthError::InvalidToken { clear_cookie }) => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            if let Some(cookie) = clear_cookie {
                response.headers_mut().insert(SET_COOKIE, cookie);
            }
            response
        }
        Err(AuthError::AuthenticationRequired | AuthError::UserInactive) => {
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    if let Some(token) = extract_cookie_token(&headers, state.config().cookie_name()) {
        if let Err(err) = state.sessions().delete_session(&token).await {
            error!("Failed to delete session: {err:#}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 204, description = "Every session for the user revoked"),
        (status = 401, description = "Missing or invalid session cookie")
    ),
    tag = "auth"
)]
pub async fn logout_all(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let ctx = match require_session_auth(&headers, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    if let Err(err) = state
        .sessions()
        .delete_all_user_sessions(ctx.principal.id)
        .await
    {
        error!("Failed to delete user sessions: {err:#}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie carrying the session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let max_age = config.session_ttl_seconds();
    let mut cookie =
        format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == cookie_name && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{clear_session_cookie, extract_bearer_token, extract_cookie_token, session_cookie};
    use crate::api::handlers::auth::state::AuthConfig;
    use axum::http::{HeaderMap, HeaderValue};

    fn config() -> AuthConfig {
        AuthConfig::new("https://gardisto.dev".to_string())
    }

    #[test]
    fn session_cookie_sets_attributes() -> Result<(), axum::http::header::InvalidHeaderValue> {
        let cookie = session_cookie(&config(), "tok")?;
        let value = cookie.to_str().unwrap_or_default();
        assert!(value.starts_with("gardisto_session=tok;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=86400"));
        assert!(value.ends_with("Secure"));
        Ok(())
    }

    #[test]
    fn insecure_frontend_omits_secure_flag() -> Result<(), axum::http::header::InvalidHeaderValue>
    {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        let cookie = session_cookie(&config, "tok")?;
        assert!(!cookie.to_str().unwrap_or_default().contains("Secure"));
        Ok(())
    }

    #[test]
    fn clear_cookie_zeroes_max_age() -> Result<(), axum::http::header::InvalidHeaderValue> {
        let cookie = clear_session_cookie(&config())?;
        let value = cookie.to_str().unwrap_or_default();
        assert!(value.starts_with("gardisto_session=;"));
        assert!(value.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn extract_cookie_token_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("a=1; gardisto_session=tok ; b=2"),
        );
        assert_eq!(
            extract_cookie_token(&headers, "gardisto_session"),
            Some("tok".to_string())
        );
        assert_eq!(extract_cookie_token(&headers, "other"), None);
    }

    #[test]
    fn extract_bearer_token_parses_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok"));
        assert_eq!(extract_bearer_token(&headers), Some("tok".to_string()));

        headers.insert("authorization", HeaderValue::from_static("bearer  tok "));
        assert_eq!(extract_bearer_token(&headers), Some("tok".to_string()));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
