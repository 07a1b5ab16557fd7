use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Literal stored in place of a session after logout or an explicit clear.
pub const NO_SESSION: &str = "null";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Officer,
    Viewer,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Officer => "Grievance Officer",
            Role::Viewer => "Viewer",
        }
    }
}

/// Profile fields that arrive after the initial login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// The authenticated identity as persisted in the storage medium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub identifier: String,
    pub credential_token: String,
    pub role: Role,
    pub is_authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    /// Minimal session written right after the credentials are accepted.
    pub fn new(
        identifier: impl Into<String>,
        credential_token: impl Into<String>,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            credential_token: credential_token.into(),
            role,
            is_authenticated: true,
            email: None,
            display_name: None,
            issued_at,
        }
    }

    /// Merge hydrated profile fields; token, role and identity are kept.
    pub fn merge_profile(&mut self, profile: Profile) {
        if profile.email.is_some() {
            self.email = profile.email;
        }
        if profile.display_name.is_some() {
            self.display_name = profile.display_name;
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.email.is_some() || self.display_name.is_some()
    }

    /// True if the same login produced both sessions.
    pub fn same_login(&self, other: &Session) -> bool {
        self.identifier == other.identifier && self.credential_token == other.credential_token
    }

    /// A lifetime reaching past the representable range never expires.
    pub fn is_expired(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        self.issued_at
            .checked_add_signed(lifetime)
            .map_or(false, |expires_at| now > expires_at)
    }

    /// Name to greet the user with in the navigation shell
    pub fn greeting_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.identifier)
    }
}

/// Serialize a session (or its absence) for the storage medium.
pub fn encode(session: Option<&Session>) -> String {
    match session {
        // Session is plain data; serialization cannot fail
        Some(s) => serde_json::to_string(s).unwrap_or_else(|_| NO_SESSION.to_string()),
        None => NO_SESSION.to_string(),
    }
}

/// Decode a stored blob. `Ok(None)` is the absent marker; anything that is
/// not a well-formed session is a `DecodeError`.
pub fn decode(raw: &str) -> Result<Option<Session>, DecodeError> {
    Ok(serde_json::from_str::<Option<Session>>(raw.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn admin() -> Session {
        let issued = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        Session::new("admin", "tok-1", Role::Admin, issued)
    }

    #[test]
    fn test_encode_decode_minimal() {
        let s = admin();
        assert_eq!(decode(&encode(Some(&s))).unwrap(), Some(s));
    }

    #[test]
    fn test_encode_decode_hydrated() {
        let mut s = admin();
        s.merge_profile(Profile {
            email: Some("admin@igms.local".to_string()),
            display_name: Some("Administrator".to_string()),
        });
        assert_eq!(decode(&encode(Some(&s))).unwrap(), Some(s));
    }

    #[test]
    fn test_absent_marker() {
        assert_eq!(encode(None), "null");
        assert_eq!(decode("null").unwrap(), None);
        assert_eq!(decode("  null\n").unwrap(), None);
    }

    #[test]
    fn test_decode_corrupt_is_error() {
        for raw in ["", "{", "not json", "42", "{\"identifier\":\"x\"}", "[]", "undefined"] {
            assert!(decode(raw).is_err(), "expected decode error for {:?}", raw);
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = encode(Some(&admin()));
        assert!(json.contains("\"credentialToken\":\"tok-1\""));
        assert!(json.contains("\"isAuthenticated\":true"));
        assert!(json.contains("\"role\":\"admin\""));
        assert!(!json.contains("email"));
    }

    #[test]
    fn test_merge_preserves_token_and_role() {
        let mut s = admin();
        s.merge_profile(Profile {
            email: Some("admin@igms.local".to_string()),
            display_name: None,
        });
        assert_eq!(s.credential_token, "tok-1");
        assert_eq!(s.role, Role::Admin);
        assert_eq!(s.email.as_deref(), Some("admin@igms.local"));
        assert_eq!(s.greeting_name(), "admin");
        assert!(s.is_hydrated());
    }

    #[test]
    fn test_is_expired() {
        let s = admin();
        let lifetime = Duration::minutes(30);
        assert!(!s.is_expired(s.issued_at + Duration::minutes(29), lifetime));
        assert!(s.is_expired(s.issued_at + Duration::minutes(31), lifetime));
    }

    #[test]
    fn test_unbounded_lifetime_does_not_overflow() {
        let s = admin();
        let lifetime = Duration::milliseconds(i64::MAX);
        assert!(!s.is_expired(s.issued_at + Duration::days(365 * 100), lifetime));
    }
}
