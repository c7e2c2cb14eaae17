//! Role hierarchy and the authorization decision.
//!
//! The hierarchy is fixed: `ADMIN` satisfies everything, `USER` satisfies
//! `USER` and `GUEST`, `GUEST` only itself. Authorization is a pure function
//! over the principal's roles and the required set.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
    Guest,
}

impl Role {
    /// Roles a holder of `self` implicitly satisfies.
    #[must_use]
    pub const fn expansion(self) -> &'static [Role] {
        match self {
            Self::Admin => &[Self::Admin, Self::User, Self::Guest],
            Self::User => &[Self::User, Self::Guest],
            Self::Guest => &[Self::Guest],
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
            Self::Guest => "GUEST",
        }
    }

    /// Parse a stored role name; unknown names are skipped by callers.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ADMIN" => Some(Self::Admin),
            "USER" => Some(Self::User),
            "GUEST" => Some(Self::Guest),
            _ => None,
        }
    }
}

/// Map stored role names to known roles, dropping anything unrecognized.
#[must_use]
pub fn parse_roles(values: &[String]) -> Vec<Role> {
    values
        .iter()
        .filter_map(|value| Role::parse(value))
        .collect()
}

/// Decide access for a principal's roles against a required set.
///
/// With `exact` false (the default mode) each granted role is expanded
/// through the hierarchy before intersecting with `required`; with `exact`
/// true only literal membership counts.
#[must_use]
pub fn authorize(granted: &[Role], required: &[Role], exact: bool) -> bool {
    if required.is_empty() {
        return true;
    }
    granted.iter().any(|role| {
        if exact {
            required.contains(role)
        } else {
            role.expansion()
                .iter()
                .any(|expanded| required.contains(expanded))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{authorize, parse_roles, Role};

    #[test]
    fn admin_satisfies_lower_roles() {
        assert!(authorize(&[Role::Admin], &[Role::User], false));
        assert!(authorize(&[Role::Admin], &[Role::Guest], false));
        assert!(authorize(&[Role::Admin], &[Role::User, Role::Guest], false));
    }

    #[test]
    fn guest_does_not_satisfy_admin() {
        assert!(!authorize(&[Role::Guest], &[Role::Admin], false));
        assert!(!authorize(&[Role::Guest], &[Role::User], false));
    }

    #[test]
    fn user_satisfies_guest_but_not_admin() {
        assert!(authorize(&[Role::User], &[Role::Guest], false));
        assert!(!authorize(&[Role::User], &[Role::Admin], false));
    }

    #[test]
    fn exact_mode_ignores_hierarchy() {
        assert!(!authorize(&[Role::Admin], &[Role::User], true));
        assert!(authorize(&[Role::Admin], &[Role::Admin], true));
    }

    #[test]
    fn empty_required_set_always_passes() {
        assert!(authorize(&[Role::Guest], &[], false));
        assert!(authorize(&[], &[], false));
    }

    #[test]
    fn empty_granted_set_fails_any_requirement() {
        assert!(!authorize(&[], &[Role::Guest], false));
    }

    #[test]
    fn parse_roles_skips_unknown_names() {
        let stored = vec![
            "ADMIN".to_string(),
            "auditor".to_string(),
            "GUEST".to_string(),
        ];
        assert_eq!(parse_roles(&stored), vec![Role::Admin, Role::Guest]);
    }

    #[test]
    fn role_names_round_trip() {
        for role in [Role::Admin, Role::User, Role::Guest] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }
}
