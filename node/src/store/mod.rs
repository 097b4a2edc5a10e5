//! Real-time tree store contract.
//!
//! Pipelines and the index consume only this trait; [`LocalStore`] is the
//! bundled sled-backed implementation. Paths are slash-separated
//! (`messages/{chatId}/{messageId}`) and address nodes in one JSON tree.

mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid path {0:?}")]
    InvalidPath(String),
    #[error("value at {0:?} is not an object")]
    NotAnObject(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Live view of one path. Delivers the current value immediately, then a
/// fresh snapshot on every change to the path or its descendants.
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { rx }
    }

    /// Next snapshot of the subscribed path; `None` once the store is
    /// gone. Missing nodes arrive as `Value::Null`.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

/// Key-addressed tree store with field-scoped merges.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Value at `path`, or `None` when the node does not exist.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replaces the value at `path` entirely. A `null` value deletes the
    /// node.
    async fn write(&self, path: &str, value: Value) -> Result<()>;

    /// Merges the given fields under `path`, leaving siblings untouched.
    /// A field key may itself be a slash path, so one call can update
    /// several subtrees at once; a `null` field deletes its target.
    async fn patch(&self, path: &str, fields: Map<String, Value>) -> Result<()>;

    /// New unique child id under `parent`, sortable by creation time.
    async fn generate_key(&self, parent: &str) -> Result<String>;

    /// Subscribes to `path`; see [`Subscription`].
    async fn subscribe(&self, path: &str) -> Result<Subscription>;
}

/// Sentinel the store resolves to its own clock at commit time, so commit
/// time rather than the client clock becomes canonical.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

pub(crate) fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .map(|obj| obj.len() == 1 && obj.get(".sv").and_then(Value::as_str) == Some("timestamp"))
        .unwrap_or(false)
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
