//! Group and group-message records.

use crate::message::ReplySnapshot;
use crate::reaction::Reaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub role: Role,
    /// Epoch millis; server-assigned at join time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<i64>,
}

/// A group conversation, stored under `groups/{groupId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub members: HashMap<String, GroupMember>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Group {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.members
            .get(user_id)
            .map(|m| m.role == Role::Admin)
            .unwrap_or(false)
    }

    pub fn admin_count(&self) -> usize {
        self.members
            .values()
            .filter(|m| m.role == Role::Admin)
            .count()
    }

    /// Earliest-joined member other than `excluding`, used to hand the
    /// admin role over when the last admin leaves. Ties and missing join
    /// times fall back to id order so every client picks the same member.
    pub fn succession_candidate(&self, excluding: &str) -> Option<&str> {
        self.members
            .iter()
            .filter(|(id, _)| id.as_str() != excluding)
            .min_by_key(|(id, m)| (m.joined_at.unwrap_or(i64::MAX), id.as_str()))
            .map(|(id, _)| id.as_str())
    }
}

/// A message in a group conversation, stored under
/// `groupMessages/{groupId}/{messageId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub message_id: String,
    pub sender_id: String,
    /// Display name captured at send time; not refreshed if the sender
    /// later renames themselves.
    #[serde(default)]
    pub sender_name: String,
    /// Original text in the sender's language.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub original_language: String,
    /// One entry per distinct recipient language at send time. A failed
    /// translation leaves the original text in that language's slot.
    #[serde(default)]
    pub translations: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplySnapshot>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub reactions: HashMap<String, Reaction>,
}

impl GroupMessage {
    /// Text shown to a reader: their language's translation when the
    /// fan-out covered it, otherwise the original. Senders always see
    /// the original.
    pub fn display_for(&self, reader_id: &str, reader_language: Option<&str>) -> &str {
        if self.sender_id == reader_id {
            return &self.message;
        }
        reader_language
            .and_then(|lang| self.translations.get(lang))
            .map(String::as_str)
            .unwrap_or(&self.message)
    }
}
