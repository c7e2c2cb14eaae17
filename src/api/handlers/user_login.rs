//! Password login.
//!
//! Unknown emails and wrong passwords produce the same response so the
//! endpoint cannot be used to probe accounts.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::auth::password::verify_password;
use super::auth::session::session_cookie;
use super::auth::types::{LoginRequest, SessionResponse};
use super::auth::utils::{extract_client_ip, normalize_email, session_metadata, valid_email};
use super::auth::{AuthState, RateLimitAction, RateLimitDecision};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Account is disabled"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return (StatusCode::UNAUTHORIZED, "Invalid email or password").into_response();
    }

    let ip = extract_client_ip(&headers);
    let limiter = state.rate_limiter();
    if limiter.check_ip(ip.as_deref(), RateLimitAction::Login) == RateLimitDecision::Limited
        || limiter.check_email(&email, RateLimitAction::Login) == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Too many attempts").into_response();
    }

    let user = match state.users().find_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "Invalid email or password").into_response();
        }
        Err(err) => {
            error!("Failed to lookup user: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let stored_hash = match state.users().password_hash(user.id).await {
        Ok(Some(hash)) => hash,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "Invalid email or password").into_response();
        }
        Err(err) => {
            error!("Failed to fetch password hash: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match verify_password(&payload.password, &stored_hash) {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::UNAUTHORIZED, "Invalid email or password").into_response();
        }
        Err(err) => {
            error!("Failed to verify password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    if !user.is_active {
        return (StatusCode::FORBIDDEN, "Account is disabled").into_response();
    }

    let token = match state
        .sessions()
        .create_session(user.id, user.roles.clone(), session_metadata(&headers))
        .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Bookkeeping only; a failed timestamp update must not fail the login.
    if let Err(err) = state.users().update_last_login(user.id).await {
        error!("Failed to update last login: {err:#}");
    }

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(state.config(), &token) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    let body = SessionResponse {
        user_id: user.id.to_string(),
        email: user.email,
        roles: user.roles,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}
