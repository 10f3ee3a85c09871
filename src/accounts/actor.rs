//! Cookie parsing and the legacy `demo_user` identity

use std::fmt;
use std::str::FromStr;

use crate::process::Actor;

pub const SESSION_COOKIE: &str = "attesta_session";
pub const LEGACY_COOKIE: &str = "demo_user";

/// Claims carried by the legacy `userID|role|workflowKey` cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyClaims {
    pub user_id: String,
    pub role: String,
    pub workflow_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed legacy identity cookie")]
pub struct MalformedClaims;

impl FromStr for LegacyClaims {
    type Err = MalformedClaims;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('|').map(str::trim);
        let (Some(user_id), Some(role), Some(workflow_key), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(MalformedClaims);
        };
        if user_id.is_empty() || role.is_empty() || workflow_key.is_empty() {
            return Err(MalformedClaims);
        }
        Ok(Self {
            user_id: user_id.to_string(),
            role: role.to_string(),
            workflow_key: workflow_key.to_string(),
        })
    }
}

impl fmt::Display for LegacyClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.user_id, self.role, self.workflow_key)
    }
}

impl From<LegacyClaims> for Actor {
    fn from(claims: LegacyClaims) -> Self {
        Actor {
            user_id: claims.user_id,
            role: claims.role,
            workflow_key: claims.workflow_key,
        }
    }
}

/// Value of one cookie from a `Cookie` header
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}

/// Legacy claims from a `Cookie` header; malformed values count as absent
pub fn legacy_claims(header: &str) -> Option<LegacyClaims> {
    cookie_value(header, LEGACY_COOKIE)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_claims() {
        let claims: LegacyClaims = "u1|dep1|demo".parse().unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.role, "dep1");
        assert_eq!(claims.workflow_key, "demo");
        assert_eq!(claims.to_string(), "u1|dep1|demo");
    }

    #[test]
    fn test_malformed_claims() {
        for raw in ["", "u1", "u1|dep1", "u1||demo", "u1|dep1|demo|extra"] {
            assert!(raw.parse::<LegacyClaims>().is_err(), "{}", raw);
        }
    }

    #[test]
    fn test_cookie_value() {
        let header = "theme=dark; attesta_session=abc123; demo_user=\"u1|dep2|demo\"";
        assert_eq!(cookie_value(header, SESSION_COOKIE), Some("abc123"));
        assert_eq!(cookie_value(header, "missing"), None);

        let actor: Actor = legacy_claims(header).unwrap().into();
        assert_eq!(actor.role, "dep2");
    }

    #[test]
    fn test_malformed_legacy_cookie_is_absent() {
        assert!(legacy_claims("demo_user=garbage").is_none());
        assert!(legacy_claims("other=1").is_none());
    }
}
