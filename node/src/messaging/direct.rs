//! 1:1 message pipeline: send, translate, variant cycling, read receipts.

use super::{reactions, PipelineError, Result};
use crate::store::{server_timestamp, RealtimeStore, Subscription};
use linguachat_messaging::{paths, DirectMessage, ReplySnapshot};
use linguachat_translate::Translator;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Request to send a direct text message.
#[derive(Debug)]
pub struct SendDirectRequest {
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    /// Language the recipient reads; drives the variant translation.
    pub recipient_language: String,
    pub reply_to: Option<ReplySnapshot>,
}

/// Response after the initial record is committed.
pub struct SendOutcome {
    pub message_id: String,
    /// The translation step keeps running after `send` returns. Callers
    /// that need the settled text (tests, tools) may await it; the UI
    /// path drops it and relies on the store subscription instead.
    pub translation: JoinHandle<()>,
}

/// Pipeline for 1:1 conversations.
pub struct DirectMessagePipeline {
    store: Arc<dyn RealtimeStore>,
    translator: Arc<dyn Translator>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl DirectMessagePipeline {
    pub fn new(store: Arc<dyn RealtimeStore>, translator: Arc<dyn Translator>) -> Self {
        Self {
            store,
            translator,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Sends a text message. Returns once the placeholder record is
    /// committed; the translation patch happens asynchronously.
    ///
    /// At most one send per conversation may be in flight; the mark
    /// clears when the translation step settles.
    pub async fn send(&self, request: SendDirectRequest) -> Result<SendOutcome> {
        let text = request.text.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }
        let language = request.recipient_language.trim().to_string();
        if language.is_empty() {
            return Err(PipelineError::MissingLanguage);
        }

        let chat_id = paths::chat_id(&request.sender_id, &request.recipient_id);
        if !self.in_flight.lock().await.insert(chat_id.clone()) {
            return Err(PipelineError::SendInFlight);
        }

        let message_id = match self
            .write_initial(&chat_id, &request.sender_id, &text, request.reply_to)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                self.in_flight.lock().await.remove(&chat_id);
                return Err(err);
            }
        };

        let translation = tokio::spawn(apply_translation(
            Arc::clone(&self.store),
            Arc::clone(&self.translator),
            Arc::clone(&self.in_flight),
            chat_id,
            message_id.clone(),
            text,
            language,
        ));

        Ok(SendOutcome {
            message_id,
            translation,
        })
    }

    /// Sends an image message; no translation step.
    pub async fn send_image(
        &self,
        sender_id: &str,
        recipient_id: &str,
        image_url: &str,
    ) -> Result<String> {
        if image_url.trim().is_empty() {
            return Err(PipelineError::EmptyMessage);
        }
        let chat_id = paths::chat_id(sender_id, recipient_id);
        let message_id = self.store.generate_key(&paths::messages(&chat_id)).await?;
        let record = DirectMessage::outgoing_image(
            message_id.clone(),
            sender_id.to_string(),
            image_url.to_string(),
        );
        self.commit(&chat_id, &message_id, &record).await?;
        Ok(message_id)
    }

    /// Cycles the displayed text to the next translation variant
    /// (var1 → var2 → var3 → var1), deriving the position from the
    /// current `message` value. Returns the text now displayed.
    pub async fn regenerate_translation(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<String> {
        let path = paths::direct_message(chat_id, message_id);
        let value = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| PipelineError::UnknownMessage(message_id.to_string()))?;
        let record: DirectMessage = serde_json::from_value(value)?;

        let (Some(var1), Some(var2)) = (record.message_var1, record.message_var2) else {
            return Err(PipelineError::VariantsUnavailable(message_id.to_string()));
        };
        let var3 = record.message_var3.unwrap_or_else(|| var1.clone());

        let next = if record.message == var1 {
            var2
        } else if record.message == var2 {
            var3
        } else {
            var1
        };

        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::from(next.clone()));
        self.store.patch(&path, fields).await?;
        Ok(next)
    }

    /// Flips `read` on every message the reader has not sent and not yet
    /// read, in one combined update. Returns how many were flipped;
    /// calling again is a no-op.
    pub async fn mark_read(&self, chat_id: &str, reader_id: &str) -> Result<usize> {
        let Some(value) = self.store.get(&paths::messages(chat_id)).await? else {
            return Ok(0);
        };
        let Some(records) = value.as_object() else {
            return Ok(0);
        };

        let mut fields = Map::new();
        for (key, record) in records {
            let sender = record.get("senderId").and_then(Value::as_str);
            let read = record.get("read").and_then(Value::as_bool).unwrap_or(false);
            if sender != Some(reader_id) && !read {
                fields.insert(format!("{key}/read"), Value::from(true));
            }
        }

        let count = fields.len();
        if count > 0 {
            self.store.patch(&paths::messages(chat_id), fields).await?;
        }
        Ok(count)
    }

    pub async fn react(
        &self,
        chat_id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let path = paths::direct_message(chat_id, message_id);
        reactions::add_reaction(self.store.as_ref(), &path, user_id, emoji).await
    }

    pub async fn unreact(
        &self,
        chat_id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let path = paths::direct_message(chat_id, message_id);
        reactions::remove_reaction(self.store.as_ref(), &path, user_id, emoji).await
    }

    /// Live view of a conversation's message tree.
    pub async fn watch_messages(&self, chat_id: &str) -> Result<Subscription> {
        Ok(self.store.subscribe(&paths::messages(chat_id)).await?)
    }

    /// Live view of a peer's language setting, so an open conversation
    /// can pick up a language switch.
    pub async fn watch_user_language(&self, user_id: &str) -> Result<Subscription> {
        Ok(self.store.subscribe(&paths::user_language(user_id)).await?)
    }

    async fn write_initial(
        &self,
        chat_id: &str,
        sender_id: &str,
        text: &str,
        reply_to: Option<ReplySnapshot>,
    ) -> Result<String> {
        let message_id = self.store.generate_key(&paths::messages(chat_id)).await?;
        let record = DirectMessage::outgoing(
            message_id.clone(),
            sender_id.to_string(),
            text.to_string(),
            reply_to,
        );
        self.commit(chat_id, &message_id, &record).await?;
        Ok(message_id)
    }

    async fn commit(
        &self,
        chat_id: &str,
        message_id: &str,
        record: &DirectMessage,
    ) -> Result<()> {
        let mut value = serde_json::to_value(record)?;
        value["timestamp"] = server_timestamp();
        self.store
            .write(&paths::direct_message(chat_id, message_id), value)
            .await?;
        Ok(())
    }
}

/// Translation step run off the send path: patch in the variants, or
/// fall back to the original text on any translation error. Failures
/// never propagate; delivery must not depend on translation.
async fn apply_translation(
    store: Arc<dyn RealtimeStore>,
    translator: Arc<dyn Translator>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    chat_id: String,
    message_id: String,
    text: String,
    language: String,
) {
    let mut fields = Map::new();
    match translator.translate_variants(&text, &language).await {
        Ok(variants) => {
            fields.insert("message".to_string(), Value::from(variants.variant1.clone()));
            fields.insert("messageVar1".to_string(), Value::from(variants.variant1));
            fields.insert("messageVar2".to_string(), Value::from(variants.variant2));
            fields.insert("messageVar3".to_string(), Value::from(variants.variant3));
        }
        Err(err) => {
            warn!(%chat_id, %message_id, %err, "translation failed, delivering original text");
            fields.insert("message".to_string(), Value::from(text));
        }
    }

    let path = paths::direct_message(&chat_id, &message_id);
    if let Err(err) = store.patch(&path, fields).await {
        error!(%chat_id, %message_id, %err, "failed to record translation result");
    }
    in_flight.lock().await.remove(&chat_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::testutil::{memory_store, StubTranslator};
    use async_trait::async_trait;
    use linguachat_messaging::TRANSLATING;
    use linguachat_translate::{
        Result as TranslateResult, TranslationVariants, Translator as _,
    };
    use tokio::sync::Semaphore;

    fn request(text: &str) -> SendDirectRequest {
        SendDirectRequest {
            sender_id: "alice".into(),
            recipient_id: "bob".into(),
            text: text.into(),
            recipient_language: "Spanish".into(),
            reply_to: None,
        }
    }

    fn pipeline_with(translator: StubTranslator) -> DirectMessagePipeline {
        DirectMessagePipeline::new(memory_store(), Arc::new(translator))
    }

    async fn fetch(pipeline: &DirectMessagePipeline, chat_id: &str, id: &str) -> DirectMessage {
        let value = pipeline
            .store
            .get(&paths::direct_message(chat_id, id))
            .await
            .unwrap()
            .unwrap();
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn send_commits_placeholder_then_patches_variants() {
        let pipeline = pipeline_with(StubTranslator::new());
        let mut sub = pipeline.watch_messages("alice_bob").await.unwrap();
        assert_eq!(sub.next().await.unwrap(), Value::Null);

        let outcome = pipeline.send(request("Hello")).await.unwrap();

        let initial = sub.next().await.unwrap();
        let initial = &initial[&outcome.message_id];
        assert_eq!(initial["message"], TRANSLATING);
        assert_eq!(initial["messageOG"], "Hello");
        assert!(initial["timestamp"].is_i64());

        outcome.translation.await.unwrap();
        let settled = fetch(&pipeline, "alice_bob", &outcome.message_id).await;
        assert_eq!(settled.message, "Hello [Spanish #1]");
        assert_eq!(settled.message_var1.as_deref(), Some("Hello [Spanish #1]"));
        assert_eq!(settled.message_var3.as_deref(), Some("Hello [Spanish #3]"));
        assert_eq!(settled.message_og, "Hello");
    }

    #[tokio::test]
    async fn translation_failure_falls_back_to_original_text() {
        let pipeline = pipeline_with(StubTranslator::failing_for(&["Spanish"]));
        let outcome = pipeline.send(request("Hello")).await.unwrap();
        outcome.translation.await.unwrap();

        let settled = fetch(&pipeline, "alice_bob", &outcome.message_id).await;
        assert_eq!(settled.message, "Hello");
        assert!(settled.message_var1.is_none());
        assert!(!settled.is_translating());
    }

    #[tokio::test]
    async fn empty_and_whitespace_text_is_rejected() {
        let pipeline = pipeline_with(StubTranslator::new());
        assert!(matches!(
            pipeline.send(request("")).await,
            Err(PipelineError::EmptyMessage)
        ));
        assert!(matches!(
            pipeline.send(request("   ")).await,
            Err(PipelineError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn missing_recipient_language_is_rejected() {
        let pipeline = pipeline_with(StubTranslator::new());
        let mut req = request("Hello");
        req.recipient_language = " ".into();
        assert!(matches!(
            pipeline.send(req).await,
            Err(PipelineError::MissingLanguage)
        ));
    }

    /// Translator that stalls until the test releases it, to hold a send
    /// in flight deterministically.
    struct GatedTranslator {
        gate: Arc<Semaphore>,
        inner: StubTranslator,
    }

    #[async_trait]
    impl linguachat_translate::Translator for GatedTranslator {
        async fn translate_variants(
            &self,
            text: &str,
            target_language: &str,
        ) -> TranslateResult<TranslationVariants> {
            let _permit = self.gate.acquire().await.expect("gate closed");
            self.inner.translate_variants(text, target_language).await
        }

        async fn translate_single(
            &self,
            text: &str,
            target_language: &str,
        ) -> TranslateResult<String> {
            let _permit = self.gate.acquire().await.expect("gate closed");
            self.inner.translate_single(text, target_language).await
        }
    }

    #[tokio::test]
    async fn second_send_in_same_conversation_is_rejected_while_in_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let pipeline = DirectMessagePipeline::new(
            memory_store(),
            Arc::new(GatedTranslator {
                gate: Arc::clone(&gate),
                inner: StubTranslator::new(),
            }),
        );

        let outcome = pipeline.send(request("first")).await.unwrap();
        assert!(matches!(
            pipeline.send(request("second")).await,
            Err(PipelineError::SendInFlight)
        ));
        // A different conversation is unaffected.
        let mut other = request("elsewhere");
        other.recipient_id = "carol".into();
        let other_outcome = pipeline.send(other).await.unwrap();

        gate.add_permits(3);
        outcome.translation.await.unwrap();
        other_outcome.translation.await.unwrap();

        let retry = pipeline.send(request("third")).await.unwrap();
        retry.translation.await.unwrap();
    }

    #[tokio::test]
    async fn regenerate_cycles_variants_with_period_three() {
        let pipeline = pipeline_with(StubTranslator::new());
        let outcome = pipeline.send(request("Hello")).await.unwrap();
        outcome.translation.await.unwrap();
        let id = outcome.message_id;

        let first = pipeline.regenerate_translation("alice_bob", &id).await.unwrap();
        assert_eq!(first, "Hello [Spanish #2]");
        let second = pipeline.regenerate_translation("alice_bob", &id).await.unwrap();
        assert_eq!(second, "Hello [Spanish #3]");
        let third = pipeline.regenerate_translation("alice_bob", &id).await.unwrap();
        assert_eq!(third, "Hello [Spanish #1]");

        let settled = fetch(&pipeline, "alice_bob", &id).await;
        assert_eq!(settled.message_og, "Hello");
    }

    #[tokio::test]
    async fn regenerate_requires_a_full_variant_run() {
        let pipeline = pipeline_with(StubTranslator::failing_for(&["Spanish"]));
        let outcome = pipeline.send(request("Hello")).await.unwrap();
        outcome.translation.await.unwrap();

        let err = pipeline
            .regenerate_translation("alice_bob", &outcome.message_id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::VariantsUnavailable(_)));
    }

    #[tokio::test]
    async fn regenerate_unknown_message_errors() {
        let pipeline = pipeline_with(StubTranslator::new());
        let err = pipeline
            .regenerate_translation("alice_bob", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownMessage(_)));
    }

    #[tokio::test]
    async fn mark_read_batches_and_is_idempotent() {
        let pipeline = pipeline_with(StubTranslator::new());

        let from_bob = SendDirectRequest {
            sender_id: "bob".into(),
            recipient_id: "alice".into(),
            text: "one".into(),
            recipient_language: "English".into(),
            reply_to: None,
        };
        let first = pipeline.send(from_bob).await.unwrap();
        first.translation.await.unwrap();
        let second = pipeline
            .send(SendDirectRequest {
                sender_id: "bob".into(),
                recipient_id: "alice".into(),
                text: "two".into(),
                recipient_language: "English".into(),
                reply_to: None,
            })
            .await
            .unwrap();
        second.translation.await.unwrap();
        let own = pipeline.send(request("mine")).await.unwrap();
        own.translation.await.unwrap();

        assert_eq!(pipeline.mark_read("alice_bob", "alice").await.unwrap(), 2);
        assert_eq!(pipeline.mark_read("alice_bob", "alice").await.unwrap(), 0);

        let bobs = fetch(&pipeline, "alice_bob", &first.message_id).await;
        assert!(bobs.read);
        let mine = fetch(&pipeline, "alice_bob", &own.message_id).await;
        assert!(!mine.read, "own messages are not read-marked");
    }

    #[tokio::test]
    async fn reply_snapshot_does_not_follow_variant_cycling() {
        let pipeline = pipeline_with(StubTranslator::new());
        let original = pipeline.send(request("Hello")).await.unwrap();
        original.translation.await.unwrap();
        let quoted = fetch(&pipeline, "alice_bob", &original.message_id).await;

        let mut reply = request("re: hello");
        reply.reply_to = Some(ReplySnapshot {
            message_id: quoted.message_id.clone(),
            message: quoted.message.clone(),
            sender_id: quoted.sender_id.clone(),
        });
        let reply_outcome = pipeline.send(reply).await.unwrap();
        reply_outcome.translation.await.unwrap();

        pipeline
            .regenerate_translation("alice_bob", &quoted.message_id)
            .await
            .unwrap();

        let stored_reply = fetch(&pipeline, "alice_bob", &reply_outcome.message_id).await;
        assert_eq!(
            stored_reply.reply_to.unwrap().message,
            "Hello [Spanish #1]",
            "snapshot keeps the text quoted at reply time"
        );
    }

    #[tokio::test]
    async fn repeated_reaction_keeps_one_entry_with_latest_timestamp() {
        let pipeline = pipeline_with(StubTranslator::new());
        let outcome = pipeline.send(request("Hello")).await.unwrap();
        outcome.translation.await.unwrap();
        let id = outcome.message_id;

        pipeline.react("alice_bob", &id, "bob", "👍").await.unwrap();
        let first = fetch(&pipeline, "alice_bob", &id).await;
        let first_ts = first.reactions["bob_👍"].timestamp;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        pipeline.react("alice_bob", &id, "bob", "👍").await.unwrap();
        pipeline.react("alice_bob", &id, "bob", "❤️").await.unwrap();

        let settled = fetch(&pipeline, "alice_bob", &id).await;
        assert_eq!(settled.reactions.len(), 2);
        assert!(settled.reactions["bob_👍"].timestamp > first_ts);

        pipeline.unreact("alice_bob", &id, "bob", "👍").await.unwrap();
        let remaining = fetch(&pipeline, "alice_bob", &id).await;
        assert_eq!(remaining.reactions.len(), 1);
        assert!(remaining.reactions.contains_key("bob_❤️"));
    }

    #[tokio::test]
    async fn image_messages_skip_translation() {
        let translator = StubTranslator::new();
        let pipeline = pipeline_with(translator);
        let id = pipeline
            .send_image("alice", "bob", "https://cdn.example/pic.png")
            .await
            .unwrap();

        let stored = fetch(&pipeline, "alice_bob", &id).await;
        assert_eq!(stored.kind, linguachat_messaging::MessageKind::Image);
        assert_eq!(stored.image_url.as_deref(), Some("https://cdn.example/pic.png"));
        assert!(!stored.is_translating());
    }
}
