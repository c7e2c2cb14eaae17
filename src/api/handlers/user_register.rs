//! Self-service registration.
//!
//! Flow Overview:
//! 1) Validate and normalize the email, check password length.
//! 2) Hash the password and insert the user with the default role.
//! 3) Issue a session so the new user is signed in immediately.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::auth::password::{hash_password, MIN_PASSWORD_LENGTH};
use super::auth::session::session_cookie;
use super::auth::types::{RegisterRequest, SessionResponse};
use super::auth::user_store::RegisterOutcome;
use super::auth::utils::{extract_client_ip, normalize_email, session_metadata, valid_email};
use super::auth::{AuthState, RateLimitAction, RateLimitDecision};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created and signed in", body = SessionResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email address").into_response();
    }
    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return (StatusCode::BAD_REQUEST, "Password is too short").into_response();
    }

    let ip = extract_client_ip(&headers);
    let limiter = state.rate_limiter();
    if limiter.check_ip(ip.as_deref(), RateLimitAction::Register) == RateLimitDecision::Limited
        || limiter.check_email(&email, RateLimitAction::Register) == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Too many attempts").into_response();
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let display_name = payload
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let user = match state
        .users()
        .insert_user(&email, display_name, &password_hash)
        .await
    {
        Ok(RegisterOutcome::Created(user)) => user,
        Ok(RegisterOutcome::Conflict) => {
            return (StatusCode::CONFLICT, "Email already registered").into_response();
        }
        Err(err) => {
            error!("Failed to insert user: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

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

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(state.config(), &token) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    let body = SessionResponse {
        user_id: user.id.to_string(),
        email: user.email,
        roles: user.roles,
    };
    (StatusCode::CREATED, response_headers, Json(body)).into_response()
}
