//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::principal::Principal;
use super::roles::Role;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub roles: Vec<Role>,
}

impl From<&Principal> for SessionResponse {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.id.to_string(),
            email: principal.email.clone(),
            roles: principal.roles.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            email: "alice@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.password, "hunter2hunter2");
        Ok(())
    }

    #[test]
    fn session_response_serializes_roles_uppercase() -> Result<()> {
        let response = SessionResponse {
            user_id: "id".to_string(),
            email: "a@example.com".to_string(),
            roles: vec![Role::Admin, Role::Guest],
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["roles"][0], "ADMIN");
        assert_eq!(value["roles"][1], "GUEST");
        Ok(())
    }
}
