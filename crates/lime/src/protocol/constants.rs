//! Well-known protocol constants: URI scheme, ping resource, reason codes.

/// URI scheme used by absolute LIME resource URIs
pub const URI_SCHEME: &str = "lime";

/// Relative URI of the ping resource
pub const PING_URI: &str = "/ping";

/// Media type of the ping resource document
pub const PING_MEDIA_TYPE: &str = "application/vnd.lime.ping+json";

/// Reason codes carried by `failed` notifications and sessions
pub mod reason_codes {
    /// Unclassified session or processing error
    pub const GENERAL_ERROR: i32 = 1;

    /// The peer selected a compression or encryption option that was not offered
    pub const SESSION_NEGOTIATION_INVALID_OPTIONS: i32 = 11;

    /// The presented credentials were rejected
    pub const SESSION_AUTHENTICATION_FAILED: i32 = 13;
}
