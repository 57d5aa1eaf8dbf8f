//! Media types tagging document payloads.

// Layer 1: Standard library imports
use std::fmt;
use std::str::FromStr;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Layer 3: Internal module imports
use super::constants::PING_MEDIA_TYPE;
use super::errors::ProtocolError;

/// A MIME media type in the form `type/subtype(+suffix)?`.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::MediaType;
///
/// let media_type: MediaType = "application/vnd.lime.ping+json".parse().unwrap();
/// assert_eq!(media_type.main_type, "application");
/// assert_eq!(media_type.subtype, "vnd.lime.ping");
/// assert_eq!(media_type.suffix.as_deref(), Some("json"));
/// assert!(media_type.is_json());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    /// Top-level type (`text`, `application`, `image`, `audio`, `video`, ...)
    pub main_type: String,
    /// Subtype, after the `/`
    pub subtype: String,
    /// Structured-syntax suffix, after the `+`
    pub suffix: Option<String>,
}

impl MediaType {
    /// Create a media type from its parts
    pub fn new(
        main_type: impl Into<String>,
        subtype: impl Into<String>,
        suffix: Option<String>,
    ) -> Self {
        Self {
            main_type: main_type.into(),
            subtype: subtype.into(),
            suffix,
        }
    }

    /// The `text/plain` media type
    pub fn text_plain() -> Self {
        Self::new("text", "plain", None)
    }

    /// The `application/json` media type
    pub fn application_json() -> Self {
        Self::new("application", "json", None)
    }

    /// The ping resource media type
    pub fn ping() -> Self {
        Self::new("application", "vnd.lime.ping", Some("json".to_string()))
    }

    /// True when the content representation is JSON: a `+json` suffix or
    /// the `application/json` type itself.
    pub fn is_json(&self) -> bool {
        self.suffix.as_deref() == Some("json")
            || (self.main_type == "application" && self.subtype == "json")
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.suffix {
            Some(suffix) => write!(f, "{}/{}+{}", self.main_type, self.subtype, suffix),
            None => write!(f, "{}/{}", self.main_type, self.subtype),
        }
    }
}

impl FromStr for MediaType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (main_type, rest) = s
            .split_once('/')
            .ok_or_else(|| ProtocolError::InvalidMediaType(s.to_string()))?;
        if main_type.is_empty() || rest.is_empty() {
            return Err(ProtocolError::InvalidMediaType(s.to_string()));
        }
        let (subtype, suffix) = match rest.split_once('+') {
            Some((subtype, suffix)) => (subtype, Some(suffix.to_string())),
            None => (rest, None),
        };
        if subtype.is_empty() || suffix.as_deref() == Some("") {
            return Err(ProtocolError::InvalidMediaType(s.to_string()));
        }
        Ok(MediaType::new(main_type, subtype, suffix))
    }
}

impl Serialize for MediaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for s in [
            "text/plain",
            "application/json",
            PING_MEDIA_TYPE,
            "image/png",
            "audio/mpeg",
            "video/mp4",
        ] {
            let media_type: MediaType = s.parse().unwrap();
            assert_eq!(media_type.to_string(), s);
        }
    }

    #[test]
    fn test_ping_matches_constant() {
        assert_eq!(MediaType::ping().to_string(), PING_MEDIA_TYPE);
    }

    #[test]
    fn test_is_json() {
        assert!(MediaType::application_json().is_json());
        assert!(MediaType::ping().is_json());
        assert!(!MediaType::text_plain().is_json());
        assert!(!"image/png".parse::<MediaType>().unwrap().is_json());
    }

    #[test]
    fn test_invalid_media_types() {
        for s in ["", "noslash", "/plain", "text/", "text/plain+"] {
            assert!(s.parse::<MediaType>().is_err(), "expected failure for {s:?}");
        }
    }

    #[test]
    fn test_serde_string_form() {
        let media_type: MediaType = "application/json".parse().unwrap();
        let json = serde_json::to_string(&media_type).unwrap();
        assert_eq!(json, r#""application/json""#);
        let parsed: MediaType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, media_type);
    }
}
