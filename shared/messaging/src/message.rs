//! Direct (1:1) message records.

use crate::reaction::Reaction;
use crate::TRANSLATING;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Denormalized copy of the replied-to message, taken at reply time.
///
/// Intentionally not a live link: later edits or variant cycling of the
/// source message do not change the quoted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplySnapshot {
    pub message_id: String,
    pub message: String,
    pub sender_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

/// A message in a 1:1 conversation, stored under
/// `messages/{chatId}/{messageId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub message_id: String,
    pub sender_id: String,
    /// Original text as typed by the sender. Immutable once set.
    #[serde(rename = "messageOG", default, skip_serializing_if = "String::is_empty")]
    pub message_og: String,
    /// Text currently displayed to the recipient: the translating
    /// placeholder, one of the variants, or the original on fallback.
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_var1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_var2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_var3: Option<String>,
    /// Server-assigned commit time in epoch millis; absent until the
    /// store resolves the timestamp sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplySnapshot>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub reactions: HashMap<String, Reaction>,
}

impl DirectMessage {
    /// Initial record for a freshly sent text message, before translation.
    pub fn outgoing(
        message_id: String,
        sender_id: String,
        text: String,
        reply_to: Option<ReplySnapshot>,
    ) -> Self {
        Self {
            message_id,
            sender_id,
            message_og: text,
            message: TRANSLATING.to_string(),
            message_var1: None,
            message_var2: None,
            message_var3: None,
            timestamp: None,
            read: false,
            reply_to,
            kind: MessageKind::Text,
            image_url: None,
            reactions: HashMap::new(),
        }
    }

    /// Initial record for an image message; image records carry no
    /// translatable text.
    pub fn outgoing_image(message_id: String, sender_id: String, image_url: String) -> Self {
        Self {
            message_id,
            sender_id,
            message_og: String::new(),
            message: String::new(),
            message_var1: None,
            message_var2: None,
            message_var3: None,
            timestamp: None,
            read: false,
            reply_to: None,
            kind: MessageKind::Image,
            image_url: Some(image_url),
            reactions: HashMap::new(),
        }
    }

    /// Text shown to `viewer`: senders always see what they typed,
    /// recipients see the translated text with the original as fallback.
    pub fn display_for(&self, viewer_id: &str) -> &str {
        if self.sender_id == viewer_id {
            &self.message_og
        } else if self.message.is_empty() {
            &self.message_og
        } else {
            &self.message
        }
    }

    /// Whether translation is still in flight from the recipient's view.
    pub fn is_translating(&self) -> bool {
        self.message == TRANSLATING
    }

    /// A full variant run exists, so variant cycling may be offered.
    pub fn has_variants(&self) -> bool {
        self.message_var2.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outgoing_starts_with_placeholder() {
        let msg = DirectMessage::outgoing(
            "m1".into(),
            "alice".into(),
            "hola".into(),
            None,
        );
        assert!(msg.is_translating());
        assert_eq!(msg.message_og, "hola");
        assert!(!msg.has_variants());
    }

    #[test]
    fn sender_sees_original_recipient_sees_translation() {
        let mut msg = DirectMessage::outgoing("m1".into(), "alice".into(), "hi".into(), None);
        msg.message = "salut".into();
        assert_eq!(msg.display_for("alice"), "hi");
        assert_eq!(msg.display_for("bob"), "salut");
    }

    #[test]
    fn serializes_with_store_field_names() {
        let msg = DirectMessage::outgoing("m1".into(), "alice".into(), "hi".into(), None);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["messageOG"], "hi");
        assert_eq!(value["message"], crate::TRANSLATING);
        assert_eq!(value["senderId"], "alice");
        assert_eq!(value["type"], "text");
        assert!(value.get("messageVar1").is_none());
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn reply_snapshot_roundtrips() {
        let msg = DirectMessage::outgoing(
            "m2".into(),
            "bob".into(),
            "sure".into(),
            Some(ReplySnapshot {
                message_id: "m1".into(),
                message: "salut".into(),
                sender_id: "alice".into(),
            }),
        );
        let value = serde_json::to_value(&msg).unwrap();
        let back: DirectMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back.reply_to.unwrap().message, "salut");
    }
}
