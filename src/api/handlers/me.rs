//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via session cookie or API key.
//! 2) Resolve the current user from the database.
//! 3) Serve profile and session management for that user only.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::principal::require_auth;
use super::auth::roles::Role;
use super::auth::utils::token_prefix;
use super::auth::AuthState;

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub roles: Vec<Role>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

/// One active session. The token doubles as the session's identifier for
/// revocation; it is only ever returned to its owner.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub token: String,
    pub created_at: i64,
    pub last_used_at: i64,
    pub expires_at: i64,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub current: bool,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = MeResponse),
        (status = 401, description = "Missing or invalid credential."),
    ),
    tag = "me"
)]
pub async fn get_me(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let ctx = match require_auth(&headers, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    match fetch_profile(&pool, ctx.principal.id).await {
        Ok(Some(profile)) => {
            let response = MeResponse {
                id: ctx.principal.id.to_string(),
                email: ctx.principal.email,
                display_name: ctx.principal.name,
                roles: ctx.principal.roles,
                is_active: ctx.principal.is_active,
                created_at: profile.created_at,
                updated_at: profile.updated_at,
                last_login_at: profile.last_login_at,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch /me profile: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/sessions",
    responses(
        (status = 200, description = "Active sessions for the authenticated user.", body = [SessionSummary]),
        (status = 401, description = "Missing or invalid credential."),
    ),
    tag = "me"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let ctx = match require_auth(&headers, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    let current_token = ctx.session.as_ref().map(|session| session.token.clone());
    match state.sessions().list_user_sessions(ctx.principal.id).await {
        Ok(sessions) => {
            let summaries: Vec<SessionSummary> = sessions
                .into_iter()
                .map(|listed| SessionSummary {
                    current: current_token.as_deref() == Some(listed.token.as_str()),
                    created_at: listed.record.created_at,
                    last_used_at: listed.record.last_used_at,
                    expires_at: listed.record.expires_at,
                    ip: listed.record.ip,
                    user_agent: listed.record.user_agent,
                    country: listed.record.country,
                    token: listed.token,
                })
                .collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(err) => {
            error!("Failed to list sessions: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/sessions/{token}",
    params(("token" = String, Path, description = "Session token to revoke")),
    responses(
        (status = 204, description = "Session revoked."),
        (status = 401, description = "Missing or invalid credential."),
        (status = 404, description = "Session not found."),
    ),
    tag = "me"
)]
pub async fn revoke_session(
    Path(token): Path<String>,
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let ctx = match require_auth(&headers, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    // Sessions of other users look identical to unknown tokens.
    let record = match state.sessions().get_session(&token).await {
        Ok(Some(record)) if record.user_id == ctx.principal.id => record,
        Ok(_) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to read session: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state.sessions().delete_session(&token).await {
        Ok(()) => {
            debug!(
                token = token_prefix(&token),
                user_id = %record.user_id,
                "session revoked by owner"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to revoke session: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

struct MeProfileRow {
    created_at: String,
    updated_at: String,
    last_login_at: Option<String>,
}

async fn fetch_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<MeProfileRow>, sqlx::Error> {
    let query = r#"
        SELECT
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at,
            CASE
                WHEN last_login_at IS NULL THEN NULL
                ELSE to_char(last_login_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
            END AS last_login_at
        FROM users
        WHERE id = $1
        LIMIT 1
    "#;
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| MeProfileRow {
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login_at: row.get("last_login_at"),
    }))
}
