//! Typed document payloads and the media-type registry.
//!
//! Messages and command resources carry a document: a media type plus a
//! content representation. Decoding goes through a process-global registry
//! mapping media-type strings to constructors, so third-party document
//! types can be registered at startup. Unregistered types degrade by
//! suffix: `+json` types decode as generic JSON, everything else as an
//! opaque string.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use super::errors::ProtocolResult;
use super::media_type::MediaType;

/// Content representation of a document
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentContent {
    /// Opaque textual content (`text/*` and unknown non-JSON types)
    Text(String),
    /// Structured JSON content (`application/json` and `*/*+json` types)
    Json(Value),
}

impl DocumentContent {
    /// The wire representation of this content
    pub fn to_value(&self) -> Value {
        match self {
            DocumentContent::Text(text) => Value::String(text.clone()),
            DocumentContent::Json(value) => value.clone(),
        }
    }
}

/// A typed payload: media type plus content.
///
/// # Examples
///
/// ```rust
/// use lime::protocol::Document;
/// use serde_json::json;
///
/// let text = Document::text_plain("hello");
/// assert_eq!(text.media_type.to_string(), "text/plain");
///
/// let json = Document::json(json!({"key": "value"}));
/// assert_eq!(json.media_type.to_string(), "application/json");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Media type tagging the content
    pub media_type: MediaType,
    /// The payload itself
    pub content: DocumentContent,
}

impl Document {
    /// Create a document from a media type and content
    pub fn new(media_type: MediaType, content: DocumentContent) -> Self {
        Self {
            media_type,
            content,
        }
    }

    /// A `text/plain` document
    pub fn text_plain(text: impl Into<String>) -> Self {
        Self::new(MediaType::text_plain(), DocumentContent::Text(text.into()))
    }

    /// An `application/json` document
    pub fn json(value: Value) -> Self {
        Self::new(MediaType::application_json(), DocumentContent::Json(value))
    }

    /// The empty ping resource document
    pub fn ping() -> Self {
        Self::new(MediaType::ping(), DocumentContent::Json(Value::Object(Default::default())))
    }
}

/// Constructor decoding raw wire content into a document content
pub type DocumentFactory = fn(Value) -> ProtocolResult<DocumentContent>;

fn registry() -> &'static RwLock<HashMap<String, DocumentFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, DocumentFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut factories: HashMap<String, DocumentFactory> = HashMap::new();
        factories.insert(MediaType::text_plain().to_string(), decode_text);
        factories.insert(MediaType::application_json().to_string(), decode_json);
        RwLock::new(factories)
    })
}

fn decode_text(raw: Value) -> ProtocolResult<DocumentContent> {
    match raw {
        Value::String(text) => Ok(DocumentContent::Text(text)),
        other => Ok(DocumentContent::Text(other.to_string())),
    }
}

fn decode_json(raw: Value) -> ProtocolResult<DocumentContent> {
    Ok(DocumentContent::Json(raw))
}

/// Register a decode constructor for a media type.
///
/// Intended to be called once at startup per third-party document type;
/// later registrations for the same type replace earlier ones.
pub fn register_document_factory(media_type: &MediaType, factory: DocumentFactory) {
    if let Ok(mut factories) = registry().write() {
        factories.insert(media_type.to_string(), factory);
    }
}

/// Decode raw wire content for the given media type.
///
/// Falls back by suffix when the type is not registered: `+json` types
/// decode as generic JSON, everything else as opaque text.
pub fn decode_document(media_type: &MediaType, raw: Value) -> ProtocolResult<Document> {
    let factory = registry()
        .read()
        .ok()
        .and_then(|factories| factories.get(&media_type.to_string()).copied());
    let content = match factory {
        Some(factory) => factory(raw)?,
        None if media_type.is_json() => decode_json(raw)?,
        None => decode_text(raw)?,
    };
    Ok(Document::new(media_type.clone(), content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_factories() {
        let doc = decode_document(&MediaType::text_plain(), json!("hello")).unwrap();
        assert_eq!(doc.content, DocumentContent::Text("hello".to_string()));

        let doc = decode_document(&MediaType::application_json(), json!({"a": 1})).unwrap();
        assert_eq!(doc.content, DocumentContent::Json(json!({"a": 1})));
    }

    #[test]
    fn test_unknown_json_type_degrades_to_json() {
        let media_type: MediaType = "application/vnd.example.thing+json".parse().unwrap();
        let doc = decode_document(&media_type, json!({"x": true})).unwrap();
        assert_eq!(doc.content, DocumentContent::Json(json!({"x": true})));
    }

    #[test]
    fn test_unknown_plain_type_degrades_to_text() {
        let media_type: MediaType = "text/markdown".parse().unwrap();
        let doc = decode_document(&media_type, json!("# title")).unwrap();
        assert_eq!(doc.content, DocumentContent::Text("# title".to_string()));
    }

    #[test]
    fn test_registered_factory_wins() {
        fn upper(raw: Value) -> ProtocolResult<DocumentContent> {
            match raw {
                Value::String(s) => Ok(DocumentContent::Text(s.to_uppercase())),
                other => Ok(DocumentContent::Text(other.to_string())),
            }
        }

        let media_type: MediaType = "text/x-shout".parse().unwrap();
        register_document_factory(&media_type, upper);

        let doc = decode_document(&media_type, json!("quiet")).unwrap();
        assert_eq!(doc.content, DocumentContent::Text("QUIET".to_string()));
    }

    #[test]
    fn test_ping_document() {
        let doc = Document::ping();
        assert_eq!(doc.media_type.to_string(), "application/vnd.lime.ping+json");
        assert_eq!(doc.content.to_value(), json!({}));
    }
}
