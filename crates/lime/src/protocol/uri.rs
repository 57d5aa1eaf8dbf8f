//! Resource URIs addressed by commands.

// Layer 1: Standard library imports
use std::fmt;
use std::str::FromStr;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

// Layer 3: Internal module imports
use super::constants::URI_SCHEME;
use super::errors::ProtocolError;

/// A command resource URI.
///
/// Relative paths such as `/ping` are accepted as-is; absolute URIs must use
/// the `lime` scheme.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::LimeUri;
///
/// let relative: LimeUri = "/ping".parse().unwrap();
/// assert_eq!(relative.as_str(), "/ping");
///
/// let absolute: LimeUri = "lime://limeprotocol.org/accounts".parse().unwrap();
/// assert!(absolute.is_absolute());
///
/// assert!("http://example.org/x".parse::<LimeUri>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimeUri {
    value: String,
    absolute: bool,
}

impl LimeUri {
    /// Parse and validate a URI string
    pub fn parse(s: impl AsRef<str>) -> Result<Self, ProtocolError> {
        s.as_ref().parse()
    }

    /// The URI of the ping resource
    pub fn ping() -> Self {
        Self {
            value: super::constants::PING_URI.to_string(),
            absolute: false,
        }
    }

    /// The underlying URI string
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// True when the URI carries a scheme and authority
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }
}

impl fmt::Display for LimeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for LimeUri {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ProtocolError::InvalidUri(s.to_string()));
        }
        match Url::parse(s) {
            Ok(url) => {
                if url.scheme() != URI_SCHEME {
                    return Err(ProtocolError::InvalidUri(s.to_string()));
                }
                Ok(Self {
                    value: s.to_string(),
                    absolute: true,
                })
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Self {
                value: s.to_string(),
                absolute: false,
            }),
            Err(_) => Err(ProtocolError::InvalidUri(s.to_string())),
        }
    }
}

impl Serialize for LimeUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LimeUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_uri() {
        let uri: LimeUri = "/ping".parse().unwrap();
        assert!(!uri.is_absolute());
        assert_eq!(uri.as_str(), "/ping");
        assert_eq!(uri, LimeUri::ping());
    }

    #[test]
    fn test_absolute_lime_uri() {
        let uri: LimeUri = "lime://limeprotocol.org/accounts/golang".parse().unwrap();
        assert!(uri.is_absolute());
    }

    #[test]
    fn test_foreign_scheme_rejected() {
        assert!("http://limeprotocol.org/ping".parse::<LimeUri>().is_err());
        assert!("".parse::<LimeUri>().is_err());
    }

    #[test]
    fn test_serde_string_form() {
        let uri = LimeUri::ping();
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, r#""/ping""#);
        let parsed: LimeUri = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, uri);
    }
}
