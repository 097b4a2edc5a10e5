//! Emoji reactions attached to messages.

use serde::{Deserialize, Serialize};

/// A single user's reaction to a message. Stored in the message's
/// `reactions` map keyed by [`reaction_key`], so a user holds at most one
/// entry per emoji and re-reacting overwrites the timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_id: String,
    pub timestamp: i64,
}

/// Map key for one (user, emoji) pair.
pub fn reaction_key(user_id: &str, emoji: &str) -> String {
    format!("{user_id}_{emoji}")
}
