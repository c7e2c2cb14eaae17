//! API key management for the authenticated user.
//!
//! These endpoints accept session cookies only. An API key cannot be used
//! to create or delete keys, so a leaked key cannot escalate itself.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::api_keys::ApiKeyRecord;
use super::auth::principal::require_session_auth;
use super::auth::AuthState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApiKeyCreateRequest {
    /// Optional human-readable label.
    pub name: Option<String>,
    /// Expiry as unix seconds; omitted means the key never expires.
    pub expires_at: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyResponse {
    pub id: String,
    pub name: Option<String>,
    pub fingerprint: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub expires_at: Option<String>,
}

impl From<ApiKeyRecord> for ApiKeyResponse {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            id: record.id.to_string(),
            name: record.name,
            fingerprint: record.fingerprint,
            created_at: record.created_at,
            last_used_at: record.last_used_at,
            expires_at: record.expires_at,
        }
    }
}

/// Creation response: the only place the plaintext key ever appears.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyCreatedResponse {
    #[serde(flatten)]
    pub key: ApiKeyResponse,
    /// Full plaintext key; it cannot be recovered later.
    pub plaintext: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeysDeletedResponse {
    pub deleted: u64,
}

#[utoipa::path(
    post,
    path = "/v1/me/api-keys",
    request_body = ApiKeyCreateRequest,
    responses(
        (status = 201, description = "Key created; the plaintext is shown exactly once.", body = ApiKeyCreatedResponse),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "api-keys"
)]
pub async fn create_api_key(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<ApiKeyCreateRequest>,
) -> impl IntoResponse {
    let ctx = match require_session_auth(&headers, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    let name = payload
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    match state
        .api_keys()
        .create_api_key(ctx.principal.id, name, payload.expires_at)
        .await
    {
        Ok(generated) => {
            let body = ApiKeyCreatedResponse {
                key: ApiKeyResponse::from(generated.record),
                plaintext: generated.plaintext,
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/me/api-keys",
    responses(
        (status = 200, description = "API keys owned by the authenticated user.", body = [ApiKeyResponse]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "api-keys"
)]
pub async fn list_api_keys(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let ctx = match require_session_auth(&headers, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    match state.api_keys().list_user_api_keys(ctx.principal.id).await {
        Ok(records) => {
            let keys: Vec<ApiKeyResponse> = records.into_iter().map(ApiKeyResponse::from).collect();
            (StatusCode::OK, Json(keys)).into_response()
        }
        Err(err) => {
            error!("Failed to list API keys: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/api-keys/{id}",
    params(("id" = String, Path, description = "API key id")),
    responses(
        (status = 204, description = "Key deleted."),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Key not found."),
    ),
    tag = "api-keys"
)]
pub async fn delete_api_key(
    Path(id): Path<String>,
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let ctx = match require_session_auth(&headers, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    let Ok(key_id) = Uuid::parse_str(id.trim()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match state
        .api_keys()
        .delete_api_key(key_id, ctx.principal.id)
        .await
    {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete API key: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/me/api-keys",
    responses(
        (status = 200, description = "All keys deleted.", body = ApiKeysDeletedResponse),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "api-keys"
)]
pub async fn delete_all_api_keys(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let ctx = match require_session_auth(&headers, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    match state
        .api_keys()
        .delete_all_user_api_keys(ctx.principal.id)
        .await
    {
        Ok(deleted) => (StatusCode::OK, Json(ApiKeysDeletedResponse { deleted })).into_response(),
        Err(err) => {
            error!("Failed to delete API keys: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
