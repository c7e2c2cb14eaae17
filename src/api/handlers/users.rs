//! Administrative user management. Every endpoint requires the `ADMIN`
//! role via the hierarchy gate.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::principal::{require_auth, require_role, AuthContext};
use super::auth::roles::{parse_roles, Role};
use super::auth::AuthState;

const USER_LIST_LIMIT: i64 = 100;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub roles: Vec<Role>,
    pub is_active: bool,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserUpdateRequest {
    pub roles: Option<Vec<Role>>,
    pub is_active: Option<bool>,
}

async fn require_admin(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<AuthContext, axum::response::Response> {
    let ctx = require_auth(headers, state)
        .await
        .map_err(axum::response::IntoResponse::into_response)?;
    require_role(&ctx, &[Role::Admin]).map_err(axum::response::IntoResponse::into_response)?;
    Ok(ctx)
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "Most recently created users.", body = [UserResponse]),
        (status = 401, description = "Missing or invalid credential."),
        (status = 403, description = "Admin role required."),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&headers, &state).await {
        return response;
    }

    match fetch_users(&pool).await {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(err) => {
            error!("Failed to list users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "The requested user.", body = UserResponse),
        (status = 401, description = "Missing or invalid credential."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&headers, &state).await {
        return response;
    }
    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match fetch_user(&pool, user_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(user)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated.", body = UserResponse),
        (status = 400, description = "Invalid update payload."),
        (status = 401, description = "Missing or invalid credential."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn update_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
    Json(payload): Json<UserUpdateRequest>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&headers, &state).await {
        return response;
    }
    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if payload.roles.is_none() && payload.is_active.is_none() {
        return (StatusCode::BAD_REQUEST, "No updates provided.").into_response();
    }

    let roles: Option<Vec<String>> = payload.roles.map(|roles| {
        roles
            .into_iter()
            .map(|role| role.as_str().to_string())
            .collect()
    });

    match apply_update(&pool, user_id, roles, payload.is_active).await {
        Ok(Some(user)) => (StatusCode::OK, Json(user)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted along with sessions and API keys."),
        (status = 401, description = "Missing or invalid credential."),
        (status = 403, description = "Admin role required."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&headers, &state).await {
        return response;
    }
    let Ok(user_id) = Uuid::parse_str(id.trim()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    // Revoke credentials before the row disappears so nothing keeps
    // authenticating against a deleted account.
    if let Err(err) = state.sessions().delete_all_user_sessions(user_id).await {
        error!("Failed to delete user sessions: {err:#}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if let Err(err) = state.api_keys().delete_all_user_api_keys(user_id).await {
        error!("Failed to delete user API keys: {err:#}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let query = "DELETE FROM users WHERE id = $1";
    match sqlx::query(query).bind(user_id).execute(&pool.0).await {
        Ok(result) if result.rows_affected() > 0 => StatusCode::NO_CONTENT.into_response(),
        Ok(_) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn user_from_row(row: sqlx::postgres::PgRow) -> UserResponse {
    let stored_roles: Vec<String> = row.get("roles");
    UserResponse {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        roles: parse_roles(&stored_roles),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
    }
}

const USER_COLUMNS: &str = r#"
    id::text AS id,
    email,
    display_name,
    roles,
    is_active,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    CASE
        WHEN last_login_at IS NULL THEN NULL
        ELSE to_char(last_login_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
    END AS last_login_at
"#;

async fn fetch_users(pool: &PgPool) -> Result<Vec<UserResponse>, sqlx::Error> {
    let query =
        format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT {USER_LIST_LIMIT}");
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    Ok(rows.into_iter().map(user_from_row).collect())
}

async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserResponse>, sqlx::Error> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(user_from_row))
}

async fn apply_update(
    pool: &PgPool,
    user_id: Uuid,
    roles: Option<Vec<String>>,
    is_active: Option<bool>,
) -> Result<Option<UserResponse>, sqlx::Error> {
    let query = format!(
        r"
        UPDATE users
        SET
            roles = COALESCE($1, roles),
            is_active = COALESCE($2, is_active),
            updated_at = NOW()
        WHERE id = $3
        RETURNING {USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(roles)
        .bind(is_active)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(user_from_row))
}
