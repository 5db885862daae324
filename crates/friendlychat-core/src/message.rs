//! Chat message record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Display name used whenever no signed-in user name is known.
pub const ANONYMOUS: &str = "anonymous";

/// Default cap on the number of characters in a composed message.
pub const DEFAULT_MSG_LENGTH_LIMIT: usize = 1000;

/// A single chat message as stored in the realtime collection.
///
/// Messages are immutable once created. Their identity in the local feed
/// is their position, not the remote key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message body.
    #[serde(default)]
    pub text: String,
    /// Display name of the author, or [`ANONYMOUS`].
    #[serde(default, rename = "name")]
    pub sender: String,
    /// Optional avatar or attachment URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ChatMessage {
    /// Create a text-only message.
    #[must_use]
    pub fn new(text: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: sender.into(),
            photo_url: None,
        }
    }

    /// Attach a photo URL.
    #[must_use]
    pub fn with_photo(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    /// Decode a message from a collection value.
    ///
    /// # Errors
    /// Returns error if the value is not a message object.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Encode the message as a collection value.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_wire_field_names() {
        let msg = ChatMessage::new("hello", "ada").with_photo("https://img/1.png");
        let value = msg.to_value().unwrap();
        assert_eq!(
            value,
            json!({"text": "hello", "name": "ada", "photoUrl": "https://img/1.png"})
        );
    }

    #[test]
    fn test_photo_omitted_when_absent() {
        let value = ChatMessage::new("hi", ANONYMOUS).to_value().unwrap();
        assert!(value.get("photoUrl").is_none());
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let msg = ChatMessage::from_value(&json!({"text": "only text"})).unwrap();
        assert_eq!(msg.text, "only text");
        assert_eq!(msg.sender, "");
        assert_eq!(msg.photo_url, None);
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(ChatMessage::from_value(&json!("just a string")).is_err());
        assert!(ChatMessage::from_value(&json!(42)).is_err());
    }
}
