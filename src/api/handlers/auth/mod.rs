//! Authentication core and its supporting modules.
//!
//! Two credential types feed one authorization decision:
//!
//! - **Sessions** are opaque random tokens held in an `HttpOnly` cookie,
//!   backed by Redis records with sliding expiration and a per-user index
//!   for multi-device management. Revocation is immediate because no state
//!   lives client-side.
//! - **API keys** are `prefix_` + 128-hex bearer tokens; only the SHA-256
//!   of the plaintext is stored, and verification is constant-time.
//!
//! [`principal::require_auth`] arbitrates between them and attaches a
//! uniform [`principal::Principal`] to the request. Key management routes
//! use [`principal::require_session_auth`] so a leaked key can never mint
//! further keys.

pub(crate) mod api_keys;
pub(crate) mod error;
pub(crate) mod password;
pub(crate) mod principal;
mod rate_limit;
pub(crate) mod roles;
pub(crate) mod session;
pub(crate) mod sessions;
mod state;
pub(crate) mod store;
pub(crate) mod types;
pub(crate) mod user_store;
pub(crate) mod utils;

pub use api_keys::{spawn_expiry_sweeper, ApiKeyManager};
pub use rate_limit::{
    FixedWindowRateLimiter, NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter,
};
pub use sessions::{SessionManager, SessionMetadata};
pub use state::{AuthConfig, AuthState};
pub use store::{CredentialStore, MemoryStore, RedisStore, SystemClock};
pub use user_store::UserStore;

#[cfg(test)]
mod tests;
