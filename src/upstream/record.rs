//! Upstream record type

use std::borrow::Cow;

use bytes::Bytes;

/// One event delivered by the upstream source
///
/// Only the body is relayed; the id is kept for logging and resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Upstream event id, if the source assigned one
    pub id: Option<String>,
    /// Opaque event body (zero-copy via reference counting)
    pub body: Bytes,
}

impl EventRecord {
    /// Create a record with no id
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            id: None,
            body: body.into(),
        }
    }

    /// Attach an upstream id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Body rendered as text, invalid UTF-8 replaced
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl From<&'static str> for EventRecord {
    fn from(body: &'static str) -> Self {
        Self::new(Bytes::from_static(body.as_bytes()))
    }
}

impl From<String> for EventRecord {
    fn from(body: String) -> Self {
        Self::new(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_text() {
        let record = EventRecord::from("hello");
        assert_eq!(record.body_text(), "hello");
        assert!(record.id.is_none());
    }

    #[test]
    fn test_body_text_lossy() {
        let record = EventRecord::new(vec![b'o', b'k', 0xFF]);
        assert_eq!(record.body_text(), "ok\u{FFFD}");
    }

    #[test]
    fn test_with_id() {
        let record = EventRecord::from("x").with_id("42");
        assert_eq!(record.id.as_deref(), Some("42"));
    }
}
