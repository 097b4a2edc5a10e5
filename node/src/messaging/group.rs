//! Group message pipeline: per-language fan-out translation and
//! membership management.

use super::{reactions, PipelineError, Result};
use crate::store::{server_timestamp, RealtimeStore, Subscription};
use linguachat_messaging::{paths, Group, GroupMessage, ReplySnapshot, DEFAULT_LANGUAGE};
use linguachat_translate::Translator;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Request to send a message into a group.
#[derive(Debug)]
pub struct SendGroupRequest {
    pub group_id: String,
    pub sender_id: String,
    pub text: String,
    pub reply_to: Option<ReplySnapshot>,
}

/// Pipeline for group conversations.
pub struct GroupMessagePipeline {
    store: Arc<dyn RealtimeStore>,
    translator: Arc<dyn Translator>,
}

impl GroupMessagePipeline {
    pub fn new(store: Arc<dyn RealtimeStore>, translator: Arc<dyn Translator>) -> Self {
        Self { store, translator }
    }

    /// Sends a group message. Translation fans out concurrently, one call
    /// per distinct recipient language; a failed language falls back to
    /// the original text so a flaky language never blocks delivery.
    pub async fn send(&self, request: SendGroupRequest) -> Result<String> {
        let text = request.text.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }

        let group = self.load_group(&request.group_id).await?;
        if !group.is_member(&request.sender_id) {
            return Err(PipelineError::NotAMember {
                user: request.sender_id,
                group: request.group_id,
            });
        }

        let languages = self.member_languages(&group).await?;
        let sender_language = languages
            .get(&request.sender_id)
            .cloned()
            .flatten()
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let targets: BTreeSet<String> = languages
            .values()
            .flatten()
            .filter(|lang| **lang != sender_language)
            .cloned()
            .collect();

        let translations = self.fan_out(&text, targets).await;
        let sender_name = self.username(&request.sender_id).await?;

        let parent = paths::group_messages(&request.group_id);
        let message_id = self.store.generate_key(&parent).await?;
        let record = GroupMessage {
            message_id: message_id.clone(),
            sender_id: request.sender_id,
            sender_name,
            message: text,
            original_language: sender_language,
            translations,
            timestamp: None,
            reply_to: request.reply_to,
            reactions: HashMap::new(),
        };

        let mut value = serde_json::to_value(&record)?;
        value["timestamp"] = server_timestamp();
        self.store
            .write(&paths::group_message(&request.group_id, &message_id), value)
            .await?;
        Ok(message_id)
    }

    /// One concurrent translation per target language. Never serialized:
    /// one slow language must not delay the others.
    async fn fan_out(
        &self,
        text: &str,
        targets: BTreeSet<String>,
    ) -> HashMap<String, String> {
        let requests = targets.into_iter().map(|language| {
            let translator = Arc::clone(&self.translator);
            async move {
                let translated = match translator.translate_single(text, &language).await {
                    Ok(translated) => translated,
                    Err(err) => {
                        warn!(%language, %err, "group translation failed, using original text");
                        text.to_string()
                    }
                };
                (language, translated)
            }
        });
        futures::future::join_all(requests).await.into_iter().collect()
    }

    /// Creates a group with the creator as admin, and marks every
    /// member's group index in the same update.
    pub async fn create_group(
        &self,
        creator_id: &str,
        name: &str,
        member_ids: &[String],
    ) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::EmptyGroupName);
        }

        let group_id = self.store.generate_key("groups").await?;
        let mut members = Map::new();
        members.insert(
            creator_id.to_string(),
            json!({ "role": "admin", "joinedAt": server_timestamp() }),
        );
        for member_id in member_ids {
            if member_id == creator_id {
                continue;
            }
            members.insert(
                member_id.to_string(),
                json!({ "role": "member", "joinedAt": server_timestamp() }),
            );
        }

        let mut fields = Map::new();
        for member_id in members.keys() {
            fields.insert(paths::user_group(member_id, &group_id), Value::from(true));
        }
        fields.insert(
            paths::group(&group_id),
            json!({
                "id": group_id.clone(),
                "name": name,
                "createdBy": creator_id,
                "createdAt": server_timestamp(),
                "members": members,
                "type": "group",
            }),
        );

        self.store.patch("", fields).await?;
        Ok(group_id)
    }

    /// Adds members in one multi-key update: the member map entries and
    /// the per-user group markers land together or not at all.
    pub async fn add_members(&self, group_id: &str, user_ids: &[String]) -> Result<()> {
        let group = self.load_group(group_id).await?;
        let mut fields = Map::new();
        for user_id in user_ids {
            if group.is_member(user_id) {
                continue;
            }
            fields.insert(
                paths::group_member(group_id, user_id),
                json!({ "role": "member", "joinedAt": server_timestamp() }),
            );
            fields.insert(paths::user_group(user_id, group_id), Value::from(true));
        }
        self.store.patch("", fields).await?;
        Ok(())
    }

    /// Removes a member (admin-only). Refuses to remove the last admin so
    /// the group is never left without one.
    pub async fn remove_member(
        &self,
        group_id: &str,
        actor_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let group = self.load_group(group_id).await?;
        self.require_admin(&group, actor_id)?;
        if !group.is_member(user_id) {
            return Err(PipelineError::NotAMember {
                user: user_id.to_string(),
                group: group_id.to_string(),
            });
        }
        if group.is_admin(user_id) && group.admin_count() == 1 {
            return Err(PipelineError::LastAdmin(group_id.to_string()));
        }

        self.store.patch("", removal_fields(group_id, user_id)).await?;
        Ok(())
    }

    /// Leaves a group. When the last admin leaves a group that still has
    /// members, the earliest-joined remaining member is promoted in the
    /// same update.
    pub async fn leave_group(&self, group_id: &str, user_id: &str) -> Result<()> {
        let group = self.load_group(group_id).await?;
        if !group.is_member(user_id) {
            return Err(PipelineError::NotAMember {
                user: user_id.to_string(),
                group: group_id.to_string(),
            });
        }

        let mut fields = removal_fields(group_id, user_id);
        if group.is_admin(user_id) && group.admin_count() == 1 {
            if let Some(successor) = group.succession_candidate(user_id) {
                fields.insert(
                    format!("{}/role", paths::group_member(group_id, successor)),
                    Value::from("admin"),
                );
            }
        }
        self.store.patch("", fields).await?;
        Ok(())
    }

    /// Promotes a member to admin (admin-only).
    pub async fn promote_member(
        &self,
        group_id: &str,
        actor_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let group = self.load_group(group_id).await?;
        self.require_admin(&group, actor_id)?;
        if !group.is_member(user_id) {
            return Err(PipelineError::NotAMember {
                user: user_id.to_string(),
                group: group_id.to_string(),
            });
        }

        let mut fields = Map::new();
        fields.insert("role".to_string(), Value::from("admin"));
        self.store
            .patch(&paths::group_member(group_id, user_id), fields)
            .await?;
        Ok(())
    }

    /// Renames the group (admin-only); single-field patch.
    pub async fn rename_group(&self, group_id: &str, actor_id: &str, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::EmptyGroupName);
        }
        let group = self.load_group(group_id).await?;
        self.require_admin(&group, actor_id)?;

        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::from(name));
        self.store.patch(&paths::group(group_id), fields).await?;
        Ok(())
    }

    pub async fn react(
        &self,
        group_id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let path = paths::group_message(group_id, message_id);
        reactions::add_reaction(self.store.as_ref(), &path, user_id, emoji).await
    }

    pub async fn unreact(
        &self,
        group_id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let path = paths::group_message(group_id, message_id);
        reactions::remove_reaction(self.store.as_ref(), &path, user_id, emoji).await
    }

    /// Live view of a group's message tree.
    pub async fn watch_messages(&self, group_id: &str) -> Result<Subscription> {
        Ok(self.store.subscribe(&paths::group_messages(group_id)).await?)
    }

    async fn load_group(&self, group_id: &str) -> Result<Group> {
        let value = self
            .store
            .get(&paths::group(group_id))
            .await?
            .ok_or_else(|| PipelineError::UnknownGroup(group_id.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    fn require_admin(&self, group: &Group, actor_id: &str) -> Result<()> {
        if group.is_admin(actor_id) {
            Ok(())
        } else {
            Err(PipelineError::NotAdmin {
                user: actor_id.to_string(),
                group: group.id.clone(),
            })
        }
    }

    async fn member_languages(
        &self,
        group: &Group,
    ) -> Result<HashMap<String, Option<String>>> {
        let mut languages = HashMap::with_capacity(group.members.len());
        for member_id in group.members.keys() {
            let language = self
                .store
                .get(&paths::user_language(member_id))
                .await?
                .and_then(|value| value.as_str().map(str::to_string));
            languages.insert(member_id.clone(), language);
        }
        Ok(languages)
    }

    async fn username(&self, user_id: &str) -> Result<String> {
        let path = format!("{}/username", paths::user(user_id));
        Ok(self
            .store
            .get(&path)
            .await?
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| user_id.to_string()))
    }
}

fn removal_fields(group_id: &str, user_id: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(paths::group_member(group_id, user_id), Value::Null);
    fields.insert(paths::user_group(user_id, group_id), Value::Null);
    fields
}
