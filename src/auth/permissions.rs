//! Permission levels for route authorization

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission levels, ordered so a simple comparison answers "is this
/// level sufficient?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
#[derive(Default)]
pub enum PermissionLevel {
    /// No authentication - health probes and public profiles
    #[default]
    Public = 0,
    /// Authenticated user - everything a normal account does
    Authenticated = 1,
    /// Admin - account moderation
    Admin = 2,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Public => write!(f, "PUBLIC"),
            PermissionLevel::Authenticated => write!(f, "AUTHENTICATED"),
            PermissionLevel::Admin => write!(f, "ADMIN"),
        }
    }
}

impl PermissionLevel {
    /// Parse from the string form stored in JWT claims
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PUBLIC" => Some(PermissionLevel::Public),
            "AUTHENTICATED" => Some(PermissionLevel::Authenticated),
            "ADMIN" => Some(PermissionLevel::Admin),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_ordering() {
        assert!(PermissionLevel::Admin > PermissionLevel::Authenticated);
        assert!(PermissionLevel::Authenticated > PermissionLevel::Public);
    }

    #[test]
    fn test_parse_roundtrip() {
        for level in [
            PermissionLevel::Public,
            PermissionLevel::Authenticated,
            PermissionLevel::Admin,
        ] {
            assert_eq!(PermissionLevel::parse(&level.to_string()), Some(level));
        }
        assert_eq!(PermissionLevel::parse("superuser"), None);
    }
}
