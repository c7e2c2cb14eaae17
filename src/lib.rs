//! # Gardisto
//!
//! `gardisto` is a session and API key authentication service. It wires
//! together cookie-based sessions, API-key bearer tokens, role-based access
//! control, rate limiting, and generated API documentation around a small
//! user store.
//!
//! ## Credential model
//!
//! - **Sessions** are opaque random tokens stored server-side in Redis with
//!   a sliding expiration window and a per-user index for multi-device
//!   management. The cookie payload carries no signed state, so revoking a
//!   session takes effect immediately.
//! - **API keys** are `prefix_` + 128-hex bearer tokens whose SHA-256 is the
//!   only thing persisted; verification is constant-time and every failure
//!   mode is indistinguishable to the caller.
//!
//! Both paths converge on one authenticated principal and a fixed role
//! hierarchy (`ADMIN` ⊇ `USER` ⊇ `GUEST`).

pub mod api;
pub mod cli;
