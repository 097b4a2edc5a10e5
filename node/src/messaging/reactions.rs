//! Reaction writes shared by the direct and group pipelines.
//!
//! Reactions live in the message's `reactions` map keyed by
//! `{userId}_{emoji}`, so re-reacting overwrites the same entry
//! (last-writer-wins on a key only its owner writes) and removal is a
//! field delete.

use super::Result;
use crate::store::{now_millis, RealtimeStore};
use linguachat_messaging::{reaction_key, Reaction};
use serde_json::{Map, Value};

pub(super) async fn add_reaction(
    store: &dyn RealtimeStore,
    message_path: &str,
    user_id: &str,
    emoji: &str,
) -> Result<()> {
    let reaction = Reaction {
        emoji: emoji.to_string(),
        user_id: user_id.to_string(),
        timestamp: now_millis(),
    };
    let mut fields = Map::new();
    fields.insert(reaction_key(user_id, emoji), serde_json::to_value(&reaction)?);
    store
        .patch(&format!("{message_path}/reactions"), fields)
        .await?;
    Ok(())
}

pub(super) async fn remove_reaction(
    store: &dyn RealtimeStore,
    message_path: &str,
    user_id: &str,
    emoji: &str,
) -> Result<()> {
    let mut fields = Map::new();
    fields.insert(reaction_key(user_id, emoji), Value::Null);
    store
        .patch(&format!("{message_path}/reactions"), fields)
        .await?;
    Ok(())
}
