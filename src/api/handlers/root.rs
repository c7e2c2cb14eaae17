use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::api::GIT_COMMIT_HASH;

// Undocumented index route; points humans at the API docs.
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "build": GIT_COMMIT_HASH,
        "docs": "/docs",
    }))
}
