//! Unified request authentication.
//!
//! A request carries at most one credential: an `Authorization: Bearer`
//! API key or a session cookie. The credential is resolved once into a
//! tagged union and matched exhaustively, so the two validation paths never
//! share state. A bearer credential is an explicit, exclusive attempt:
//! when it fails there is no fallback to the cookie.
//!
//! The session path re-resolves the live user on every request; the role
//! snapshot inside the session record is never authoritative.

use axum::http::HeaderMap;
use tracing::warn;
use uuid::Uuid;

use super::error::AuthError;
use super::roles::{authorize, Role};
use super::session::{clear_session_cookie, extract_bearer_token, extract_cookie_token};
use super::sessions::SessionRecord;
use super::state::AuthState;
use super::user_store::UserRecord;
use super::utils::token_prefix;

/// The uniform authenticated identity, built once per request regardless
/// of which credential type authenticated it.
#[derive(Clone, Debug)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub roles: Vec<Role>,
    pub is_active: bool,
}

impl Principal {
    fn from_user(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.display_name,
            roles: user.roles,
            is_active: user.is_active,
        }
    }
}

/// The session behind a cookie-authenticated request.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub token: String,
    pub record: SessionRecord,
}

/// Outcome of authentication, attached to the request by handlers.
#[derive(Debug)]
pub struct AuthContext {
    pub principal: Principal,
    pub session: Option<SessionHandle>,
    pub api_key_id: Option<Uuid>,
}

/// The credential a request presented, resolved exactly once.
#[derive(Debug)]
pub enum Credential {
    ApiKey(String),
    SessionCookie(String),
    None,
}

impl Credential {
    /// A bearer header wins over a cookie; its presence makes the API-key
    /// path the only one attempted.
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Self {
        if let Some(token) = extract_bearer_token(headers) {
            return Self::ApiKey(token);
        }
        if let Some(token) = extract_cookie_token(headers, cookie_name) {
            return Self::SessionCookie(token);
        }
        Self::None
    }
}

/// Authenticate a request from either credential type.
///
/// # Errors
/// `AuthenticationRequired` when no credential is present, `InvalidToken`
/// for any presented-but-unusable credential, `UserInactive` for a valid
/// session whose owner is disabled.
pub async fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<AuthContext, AuthError> {
    match Credential::from_headers(headers, state.config().cookie_name()) {
        Credential::ApiKey(token) => authenticate_api_key(&token, state).await,
        Credential::SessionCookie(token) => authenticate_session_token(&token, state).await,
        Credential::None => Err(AuthError::AuthenticationRequired),
    }
}

/// Session-only authentication for endpoints that must not accept API
/// keys, such as key management itself.
///
/// # Errors
/// As [`require_auth`]; a bearer credential is rejected outright.
pub async fn require_session_auth(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<AuthContext, AuthError> {
    match Credential::from_headers(headers, state.config().cookie_name()) {
        Credential::ApiKey(_) => Err(AuthError::InvalidToken { clear_cookie: None }),
        Credential::SessionCookie(token) => authenticate_session_token(&token, state).await,
        Credential::None => Err(AuthError::AuthenticationRequired),
    }
}

async fn authenticate_api_key(token: &str, state: &AuthState) -> Result<AuthContext, AuthError> {
    let validated = state
        .api_keys()
        .validate_api_key(token)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::InvalidToken { clear_cookie: None })?;

    state.api_keys().spawn_update_last_used(validated.key_id);

    Ok(AuthContext {
        principal: Principal::from_user(validated.user),
        session: None,
        api_key_id: Some(validated.key_id),
    })
}

async fn authenticate_session_token(
    token: &str,
    state: &AuthState,
) -> Result<AuthContext, AuthError> {
    let record = state
        .sessions()
        .get_session(token)
        .await
        .map_err(AuthError::Internal)?
        .ok_or_else(|| AuthError::InvalidToken {
            clear_cookie: clear_session_cookie(state.config()).ok(),
        })?;

    let user = state
        .users()
        .find_by_id(record.user_id)
        .await
        .map_err(AuthError::Internal)?;

    let Some(user) = user else {
        // The owning account is gone; drop the orphaned session.
        if let Err(err) = state.sessions().delete_session(token).await {
            warn!(
                token = token_prefix(token),
                "failed to delete orphaned session: {err:#}"
            );
        }
        return Err(AuthError::AuthenticationRequired);
    };

    if !user.is_active {
        // Blocked, not logged out: the session stays valid.
        return Err(AuthError::UserInactive);
    }

    Ok(AuthContext {
        principal: Principal::from_user(user),
        session: Some(SessionHandle {
            token: token.to_string(),
            record,
        }),
        api_key_id: None,
    })
}

/// Gate an authenticated context on the role hierarchy.
///
/// # Errors
/// `InsufficientRole` when none of the principal's roles satisfies the
/// required set under hierarchical expansion.
pub fn require_role(ctx: &AuthContext, required: &[Role]) -> Result<(), AuthError> {
    if authorize(&ctx.principal.roles, required, false) {
        Ok(())
    } else {
        Err(AuthError::InsufficientRole)
    }
}

#[cfg(test)]
mod tests {
    use super::{require_role, AuthContext, Credential, Principal};
    use crate::api::handlers::auth::error::AuthError;
    use crate::api::handlers::auth::roles::Role;
    use axum::http::{HeaderMap, HeaderValue};
    use uuid::Uuid;

    fn context_with_roles(roles: Vec<Role>) -> AuthContext {
        AuthContext {
            principal: Principal {
                id: Uuid::new_v4(),
                email: "user@example.com".to_string(),
                name: None,
                roles,
                is_active: true,
            },
            session: None,
            api_key_id: None,
        }
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        headers.insert(
            "cookie",
            HeaderValue::from_static("gardisto_session=cookietoken"),
        );
        let credential = Credential::from_headers(&headers, "gardisto_session");
        assert!(matches!(credential, Credential::ApiKey(token) if token == "abc123"));
    }

    #[test]
    fn cookie_used_without_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("other=1; gardisto_session=cookietoken"),
        );
        let credential = Credential::from_headers(&headers, "gardisto_session");
        assert!(matches!(credential, Credential::SessionCookie(token) if token == "cookietoken"));
    }

    #[test]
    fn no_credential_resolves_to_none() {
        let headers = HeaderMap::new();
        assert!(matches!(
            Credential::from_headers(&headers, "gardisto_session"),
            Credential::None
        ));
    }

    #[test]
    fn require_role_expands_hierarchy() {
        let ctx = context_with_roles(vec![Role::Admin]);
        assert!(require_role(&ctx, &[Role::User]).is_ok());

        let ctx = context_with_roles(vec![Role::Guest]);
        assert!(matches!(
            require_role(&ctx, &[Role::Admin]),
            Err(AuthError::InsufficientRole)
        ));
    }
}
