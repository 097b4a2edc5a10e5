use crate::config::AppConfig;
use crate::index::ConversationIndex;
use crate::messaging::{DirectMessagePipeline, GroupMessagePipeline};
use crate::store::RealtimeStore;
use linguachat_translate::Translator;
use std::sync::Arc;

pub struct AppState {
    config: AppConfig,
    store: Arc<dyn RealtimeStore>,
    direct: DirectMessagePipeline,
    group: GroupMessagePipeline,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RealtimeStore>,
        translator: Arc<dyn Translator>,
    ) -> Arc<Self> {
        let direct = DirectMessagePipeline::new(Arc::clone(&store), Arc::clone(&translator));
        let group = GroupMessagePipeline::new(Arc::clone(&store), translator);
        Arc::new(Self {
            config,
            store,
            direct,
            group,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_id(&self) -> &str {
        &self.config.build_id
    }

    pub fn direct(&self) -> &DirectMessagePipeline {
        &self.direct
    }

    pub fn group(&self) -> &GroupMessagePipeline {
        &self.group
    }

    pub fn index_for(&self, user_id: &str) -> ConversationIndex {
        ConversationIndex::new(Arc::clone(&self.store), user_id)
    }
}
