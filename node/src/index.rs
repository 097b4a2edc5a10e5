//! Per-peer and per-group conversation summaries.
//!
//! Summaries are recomputed in full from the message tree on every store
//! event; conversations are small and independently subscribed, so no
//! incremental maintenance is attempted.

use crate::store::{RealtimeStore, Result, Subscription};
use linguachat_messaging::{paths, UserProfile};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Preview of the newest message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub sender_id: String,
}

/// What a conversation list needs to render one 1:1 row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub has_conversation: bool,
    pub latest_message_timestamp: i64,
    pub unread_count: usize,
    pub last_message: Option<LastMessage>,
}

/// What a conversation list needs to render one group row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub latest_message_timestamp: i64,
    pub last_message: Option<LastMessage>,
}

/// Derives conversation summaries for one user.
pub struct ConversationIndex {
    store: Arc<dyn RealtimeStore>,
    user_id: String,
}

impl ConversationIndex {
    pub fn new(store: Arc<dyn RealtimeStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    /// Summaries of every 1:1 conversation the user takes part in,
    /// keyed by peer id.
    pub async fn direct_summaries(&self) -> Result<HashMap<String, ConversationSummary>> {
        let tree = self.store.get("messages").await?;
        Ok(direct_summaries_from(&self.user_id, tree.as_ref()))
    }

    /// Summaries of every group the user belongs to, keyed by group id.
    pub async fn group_summaries(&self) -> Result<HashMap<String, GroupSummary>> {
        let mut summaries = HashMap::new();
        let Some(markers) = self.store.get(&paths::user_groups(&self.user_id)).await? else {
            return Ok(summaries);
        };
        let Some(markers) = markers.as_object() else {
            return Ok(summaries);
        };

        for group_id in markers.keys() {
            let messages = self.store.get(&paths::group_messages(group_id)).await?;
            let (latest_ts, last_message) = newest_of(messages.as_ref().and_then(Value::as_object));
            summaries.insert(
                group_id.clone(),
                GroupSummary {
                    latest_message_timestamp: latest_ts,
                    last_message,
                },
            );
        }
        Ok(summaries)
    }

    /// Recomputes the direct summaries on every change to the message
    /// tree and emits them on the returned channel. The recompute task
    /// stops when the receiver is dropped.
    pub async fn watch_direct(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<HashMap<String, ConversationSummary>>> {
        let mut subscription: Subscription = self.store.subscribe("messages").await?;
        let user_id = self.user_id.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(tree) = subscription.next().await {
                let summaries = direct_summaries_from(&user_id, Some(&tree));
                if tx.send(summaries).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Peer ids ordered by most recent activity, newest first. Ties keep the
/// incoming order.
pub fn sort_peers(summaries: &HashMap<String, ConversationSummary>) -> Vec<String> {
    let mut peers: Vec<(&String, i64)> = summaries
        .iter()
        .map(|(peer, summary)| (peer, summary.latest_message_timestamp))
        .collect();
    peers.sort_by(|a, b| b.1.cmp(&a.1));
    peers.into_iter().map(|(peer, _)| peer.clone()).collect()
}

/// Client-side search: case-insensitive substring match on username or
/// email. A blank query keeps every candidate.
pub fn filter_users<'a>(users: &'a [UserProfile], query: &str) -> Vec<&'a UserProfile> {
    let query = query.trim();
    if query.is_empty() {
        return users.iter().collect();
    }
    users.iter().filter(|user| user.matches(query)).collect()
}

/// Preview text clipped to `max` characters with an ellipsis.
pub fn truncate_preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max).collect();
    clipped.push_str("...");
    clipped
}

fn direct_summaries_from(
    user_id: &str,
    tree: Option<&Value>,
) -> HashMap<String, ConversationSummary> {
    let mut summaries = HashMap::new();
    let Some(conversations) = tree.and_then(Value::as_object) else {
        return summaries;
    };

    for (chat_id, records) in conversations {
        let Some(peer) = peer_of(chat_id, user_id) else {
            continue;
        };
        let Some(records) = records.as_object() else {
            continue;
        };

        let mut unread = 0;
        for record in records.values() {
            let sender = record.get("senderId").and_then(Value::as_str);
            let read = record.get("read").and_then(Value::as_bool).unwrap_or(false);
            if sender != Some(user_id) && !read {
                unread += 1;
            }
        }

        let (latest_ts, last_message) = newest_of(Some(records));
        summaries.insert(
            peer.to_string(),
            ConversationSummary {
                has_conversation: true,
                latest_message_timestamp: latest_ts,
                unread_count: unread,
                last_message,
            },
        );
    }
    summaries
}

fn peer_of<'a>(chat_id: &'a str, user_id: &str) -> Option<&'a str> {
    chat_id
        .strip_prefix(user_id)
        .and_then(|rest| rest.strip_prefix('_'))
        .or_else(|| {
            chat_id
                .strip_suffix(user_id)
                .and_then(|rest| rest.strip_suffix('_'))
        })
}

/// Newest record of a message tree by server timestamp, as a preview.
fn newest_of(records: Option<&serde_json::Map<String, Value>>) -> (i64, Option<LastMessage>) {
    let Some(records) = records else {
        return (0, None);
    };

    let mut latest_ts = 0;
    let mut latest = None;
    for record in records.values() {
        let ts = record.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        if latest.is_none() || ts >= latest_ts {
            latest_ts = ts;
            latest = Some(record);
        }
    }

    let preview = latest.map(|record| {
        let text = record
            .get("message")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .or_else(|| record.get("messageOG").and_then(Value::as_str))
            .unwrap_or_default();
        LastMessage {
            text: text.to_string(),
            sender_id: record
                .get("senderId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    });
    (latest_ts, preview)
}
