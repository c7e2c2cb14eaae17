//! Authentication failure taxonomy and its HTTP mapping.
//!
//! Credential-validation ambiguity is collapsed before reaching the client:
//! "not found", "expired", and "malformed" all surface as the same
//! `InvalidToken` response. Store failures are logged with detail and
//! returned as a generic internal error.

use axum::{
    http::{header::SET_COOKIE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use super::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("authentication required")]
    AuthenticationRequired,

    /// A credential was presented but is invalid, malformed, or expired.
    /// Carries a pre-built clearing cookie when a dead session cookie
    /// should be removed from the client.
    #[error("invalid or expired token")]
    InvalidToken { clear_cookie: Option<HeaderValue> },

    /// Valid credential, but the owning account is disabled.
    #[error("user is inactive")]
    UserInactive,

    /// The acting user does not exist (API-key creation path).
    #[error("user not found")]
    UserNotFound,

    /// The acting user exists but is disabled (API-key creation path).
    #[error("account is disabled")]
    AccountDisabled,

    /// Authenticated, but the role check failed.
    #[error("insufficient role")]
    InsufficientRole,

    /// Store or database failure; detail is logged, not returned.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::AuthenticationRequired => {
                (StatusCode::UNAUTHORIZED, "Authentication required").into_response()
            }
            Self::InvalidToken { clear_cookie } => {
                let mut response =
                    (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response();
                if let Some(cookie) = clear_cookie {
                    response.headers_mut().insert(SET_COOKIE, cookie);
                }
                response
            }
            Self::UserInactive => (StatusCode::FORBIDDEN, "User is inactive").into_response(),
            Self::UserNotFound => (StatusCode::NOT_FOUND, "User not found").into_response(),
            Self::AccountDisabled => {
                (StatusCode::FORBIDDEN, "Account is disabled").into_response()
            }
            Self::InsufficientRole => {
                (StatusCode::FORBIDDEN, "Insufficient role").into_response()
            }
            Self::Internal(err) => {
                error!("Authentication internals failed: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;
    use axum::http::{header::SET_COOKIE, HeaderValue, StatusCode};
    use axum::response::IntoResponse;

    #[test]
    fn invalid_token_carries_clearing_cookie() {
        let cookie = HeaderValue::from_static("gardisto_session=; Max-Age=0");
        let response = AuthError::InvalidToken {
            clear_cookie: Some(cookie.clone()),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(SET_COOKIE), Some(&cookie));
    }

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        let cases = [
            (AuthError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (AuthError::UserInactive, StatusCode::FORBIDDEN),
            (AuthError::UserNotFound, StatusCode::NOT_FOUND),
            (AuthError::AccountDisabled, StatusCode::FORBIDDEN),
            (AuthError::InsufficientRole, StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn internal_error_is_opaque() {
        let response = AuthError::Internal(anyhow::anyhow!("redis down")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
