//! Authentication schemes and their polymorphic payloads.
//!
//! A session's `authenticating` phase carries a scheme tag plus a
//! scheme-specific payload. The payload shapes are:
//!
//! - `guest` and `transport`: empty objects (transport credentials come
//!   from the transport layer, e.g. a client certificate)
//! - `plain`: `{ "password": base64(utf8) }`
//! - `key`: `{ "key": base64(utf8) }`
//! - `external`: `{ "token": ..., "issuer": ... }`

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Layer 3: Internal module imports
use crate::protocol::{ProtocolError, ProtocolResult};

/// Authentication scheme identifiers offered during establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationScheme {
    /// Anonymous access
    Guest,
    /// Credentials taken from the transport layer
    Transport,
    /// Password credential
    Plain,
    /// Pre-shared key credential
    Key,
    /// Token issued by an external authority
    External,
}

impl fmt::Display for AuthenticationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthenticationScheme::Guest => "guest",
            AuthenticationScheme::Transport => "transport",
            AuthenticationScheme::Plain => "plain",
            AuthenticationScheme::Key => "key",
            AuthenticationScheme::External => "external",
        };
        f.write_str(name)
    }
}

/// A scheme-tagged authentication payload.
///
/// # Examples
///
/// ```rust
/// use lime::authentication::{Authentication, AuthenticationScheme};
///
/// let auth = Authentication::plain_from_password("mypassword");
/// assert_eq!(auth.scheme(), AuthenticationScheme::Plain);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Authentication {
    /// Anonymous access, empty payload
    Guest,
    /// Transport-layer credentials, empty payload
    Transport,
    /// Base64-encoded password
    Plain {
        /// `base64(utf8-password)`
        password: String,
    },
    /// Base64-encoded pre-shared key
    Key {
        /// `base64(utf8-key)`
        key: String,
    },
    /// Externally issued token
    External {
        /// The token value
        token: String,
        /// The issuing authority
        issuer: String,
    },
}

impl Authentication {
    /// The scheme this payload belongs to
    pub fn scheme(&self) -> AuthenticationScheme {
        match self {
            Authentication::Guest => AuthenticationScheme::Guest,
            Authentication::Transport => AuthenticationScheme::Transport,
            Authentication::Plain { .. } => AuthenticationScheme::Plain,
            Authentication::Key { .. } => AuthenticationScheme::Key,
            Authentication::External { .. } => AuthenticationScheme::External,
        }
    }

    /// Build a `plain` payload, base64-encoding the clear-text password
    pub fn plain_from_password(password: &str) -> Self {
        Authentication::Plain {
            password: BASE64.encode(password.as_bytes()),
        }
    }

    /// Build a `key` payload, base64-encoding the clear-text key
    pub fn key_from_key(key: &str) -> Self {
        Authentication::Key {
            key: BASE64.encode(key.as_bytes()),
        }
    }

    /// Decode the clear-text password of a `plain` payload
    pub fn decoded_password(&self) -> ProtocolResult<String> {
        match self {
            Authentication::Plain { password } => decode_base64_utf8(password, "plain"),
            _ => Err(ProtocolError::InvalidAuthentication {
                scheme: self.scheme().to_string(),
            }),
        }
    }

    /// Decode the clear-text key of a `key` payload
    pub fn decoded_key(&self) -> ProtocolResult<String> {
        match self {
            Authentication::Key { key } => decode_base64_utf8(key, "key"),
            _ => Err(ProtocolError::InvalidAuthentication {
                scheme: self.scheme().to_string(),
            }),
        }
    }

    /// The wire representation of the payload (scheme tag excluded)
    pub fn to_payload(&self) -> Value {
        match self {
            Authentication::Guest | Authentication::Transport => json!({}),
            Authentication::Plain { password } => json!({ "password": password }),
            Authentication::Key { key } => json!({ "key": key }),
            Authentication::External { token, issuer } => {
                json!({ "token": token, "issuer": issuer })
            }
        }
    }

    /// Rebuild a payload from its scheme tag and wire representation
    pub fn from_scheme_payload(
        scheme: AuthenticationScheme,
        payload: Value,
    ) -> ProtocolResult<Self> {
        let invalid = || ProtocolError::InvalidAuthentication {
            scheme: scheme.to_string(),
        };
        match scheme {
            AuthenticationScheme::Guest => Ok(Authentication::Guest),
            AuthenticationScheme::Transport => Ok(Authentication::Transport),
            AuthenticationScheme::Plain => {
                let password = payload
                    .get("password")
                    .and_then(Value::as_str)
                    .ok_or_else(invalid)?;
                Ok(Authentication::Plain {
                    password: password.to_string(),
                })
            }
            AuthenticationScheme::Key => {
                let key = payload
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(invalid)?;
                Ok(Authentication::Key {
                    key: key.to_string(),
                })
            }
            AuthenticationScheme::External => {
                let token = payload
                    .get("token")
                    .and_then(Value::as_str)
                    .ok_or_else(invalid)?;
                let issuer = payload
                    .get("issuer")
                    .and_then(Value::as_str)
                    .ok_or_else(invalid)?;
                Ok(Authentication::External {
                    token: token.to_string(),
                    issuer: issuer.to_string(),
                })
            }
        }
    }
}

fn decode_base64_utf8(encoded: &str, scheme: &str) -> ProtocolResult<String> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| ProtocolError::InvalidAuthentication {
            scheme: scheme.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidAuthentication {
        scheme: scheme.to_string(),
    })
}

/// Role assigned to an authenticated identity within its domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DomainRole {
    /// Not authenticated; rejects the session
    #[default]
    Unknown,
    /// Ordinary member of the domain
    Member,
    /// Authority over the domain
    Authority,
    /// Authority over the domain and its subdomains
    RootAuthority,
}

/// Outcome of verifying a presented credential
#[derive(Debug, Clone, Default)]
pub struct AuthenticationResult {
    /// The role granted to the identity; `Unknown` rejects the session
    pub role: DomainRole,
    /// Payload to send back to the client for another authentication
    /// round-trip; `None` completes the exchange
    pub round_trip: Option<Authentication>,
}

impl AuthenticationResult {
    /// Accept the identity as a domain member
    pub fn member() -> Self {
        Self {
            role: DomainRole::Member,
            round_trip: None,
        }
    }

    /// Reject the identity
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Continue the exchange with another round-trip payload
    pub fn round_trip(authentication: Authentication) -> Self {
        Self {
            role: DomainRole::Unknown,
            round_trip: Some(authentication),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_password_round_trip() {
        let auth = Authentication::plain_from_password("mypassword");
        match &auth {
            Authentication::Plain { password } => assert_eq!(password, "bXlwYXNzd29yZA=="),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(auth.decoded_password().unwrap(), "mypassword");
    }

    #[test]
    fn test_key_round_trip() {
        let auth = Authentication::key_from_key("secret-key");
        assert_eq!(auth.decoded_key().unwrap(), "secret-key");
        assert_eq!(auth.scheme(), AuthenticationScheme::Key);
    }

    #[test]
    fn test_payload_round_trip_per_scheme() {
        let cases = [
            Authentication::Guest,
            Authentication::Transport,
            Authentication::plain_from_password("pw"),
            Authentication::key_from_key("k"),
            Authentication::External {
                token: "token-1".to_string(),
                issuer: "issuer.org".to_string(),
            },
        ];
        for auth in cases {
            let rebuilt =
                Authentication::from_scheme_payload(auth.scheme(), auth.to_payload()).unwrap();
            assert_eq!(rebuilt, auth);
        }
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let result =
            Authentication::from_scheme_payload(AuthenticationScheme::Plain, serde_json::json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn test_scheme_wire_names() {
        let json = serde_json::to_string(&AuthenticationScheme::External).unwrap();
        assert_eq!(json, r#""external""#);
        let scheme: AuthenticationScheme = serde_json::from_str(r#""guest""#).unwrap();
        assert_eq!(scheme, AuthenticationScheme::Guest);
    }

    #[test]
    fn test_result_constructors() {
        assert_eq!(AuthenticationResult::member().role, DomainRole::Member);
        assert_eq!(AuthenticationResult::unknown().role, DomainRole::Unknown);
        assert!(AuthenticationResult::round_trip(Authentication::Guest)
            .round_trip
            .is_some());
    }
}
