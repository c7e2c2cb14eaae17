//! API handlers for gardisto.
//!
//! Route handlers live here; the authentication core (sessions, API keys,
//! the unified authenticator, and the role gate) lives in [`auth`].

pub mod auth;
pub mod health;
pub mod me;
pub mod me_api_keys;
pub mod root;
pub mod user_login;
pub mod user_register;
pub mod users;
