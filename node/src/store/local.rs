//! Sled-backed store with in-memory subscriber fan-out.

use super::{
    is_server_timestamp, now_millis, RealtimeStore, Result, StoreError, Subscription,
};
use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::{mpsc, RwLock};

const PUSH_ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// In-process store: one JSON tree guarded by an async lock, snapshotted
/// to sled on every commit, with subscribers notified in-line.
pub struct LocalStore {
    root: RwLock<Value>,
    db: sled::Db,
    subscribers: RwLock<Vec<Subscriber>>,
    keygen: Mutex<KeyGen>,
}

struct Subscriber {
    path: Vec<String>,
    tx: mpsc::UnboundedSender<Value>,
}

impl LocalStore {
    const TREE: &'static str = "state";
    const SNAPSHOT_KEY: &'static [u8] = b"root";

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// Store backed by a throwaway sled database; used by tests and demos.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(Self::TREE)?;
        let root = match tree.get(Self::SNAPSHOT_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Value::Object(Map::new()),
        };
        Ok(Self {
            root: RwLock::new(root),
            db,
            subscribers: RwLock::new(Vec::new()),
            keygen: Mutex::new(KeyGen::default()),
        })
    }

    fn persist(&self, root: &Value) -> Result<()> {
        let tree = self.db.open_tree(Self::TREE)?;
        tree.insert(Self::SNAPSHOT_KEY, serde_json::to_vec(root)?)?;
        tree.flush()?;
        Ok(())
    }

    /// Applies a batch of path updates under one lock, persists once, and
    /// notifies each affected subscriber once. A subscriber is affected
    /// when its path is an ancestor or descendant of a changed path.
    async fn apply(&self, changes: Vec<(Vec<String>, Value)>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut root = self.root.write().await;
        let now = now_millis();
        let mut touched = Vec::with_capacity(changes.len());
        for (segments, mut value) in changes {
            resolve_timestamps(&mut value, now);
            set_at(&mut root, &segments, value)?;
            touched.push(segments);
        }
        self.persist(&root)?;
        self.notify(&root, &touched).await;
        Ok(())
    }

    async fn notify(&self, root: &Value, touched: &[Vec<String>]) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|sub| {
            if !touched.iter().any(|path| paths_related(&sub.path, path)) {
                return !sub.tx.is_closed();
            }
            let snapshot = value_at(root, &sub.path).cloned().unwrap_or(Value::Null);
            sub.tx.send(snapshot).is_ok()
        });
    }
}

#[async_trait]
impl RealtimeStore for LocalStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let segments = segments(path)?;
        let root = self.root.read().await;
        Ok(value_at(&root, &segments).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        let segments = segments(path)?;
        self.apply(vec![(segments, value)]).await
    }

    async fn patch(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        let base = segments(path)?;
        let mut changes = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let mut target = base.clone();
            target.extend(segments(&key)?);
            changes.push((target, value));
        }
        self.apply(changes).await
    }

    async fn generate_key(&self, parent: &str) -> Result<String> {
        segments(parent)?;
        let mut keygen = self.keygen.lock().expect("keygen lock poisoned");
        Ok(keygen.next(now_millis()))
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let segments = segments(path)?;
        let (tx, rx) = mpsc::unbounded_channel();

        // Registration happens under the root lock so no commit can land
        // between the initial snapshot and the subscriber taking effect.
        let root = self.root.read().await;
        let current = value_at(&root, &segments).cloned().unwrap_or(Value::Null);
        let _ = tx.send(current);
        self.subscribers.write().await.push(Subscriber {
            path: segments,
            tx,
        });
        drop(root);

        Ok(Subscription::new(rx))
    }
}

fn segments(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    path.split('/')
        .map(|segment| {
            if segment.is_empty() {
                Err(StoreError::InvalidPath(path.to_string()))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

fn value_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_at(root: &mut Value, segments: &[String], value: Value) -> Result<()> {
    let Some((last, parents)) = segments.split_last() else {
        *root = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        return Ok(());
    };

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let map = current
            .as_object_mut()
            .ok_or_else(|| StoreError::NotAnObject(segments[..=depth].join("/")))?;
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    let map = current
        .as_object_mut()
        .ok_or_else(|| StoreError::NotAnObject(segments.join("/")))?;
    if value.is_null() {
        map.remove(last);
    } else {
        map.insert(last.clone(), value);
    }
    Ok(())
}

fn resolve_timestamps(value: &mut Value, now: i64) {
    if is_server_timestamp(value) {
        *value = Value::from(now);
        return;
    }
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                resolve_timestamps(child, now);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                resolve_timestamps(child, now);
            }
        }
        _ => {}
    }
}

/// A subscriber at `sub` observes a change at `changed` when either path
/// is a prefix of the other.
fn paths_related(sub: &[String], changed: &[String]) -> bool {
    let shorter = sub.len().min(changed.len());
    sub[..shorter] == changed[..shorter]
}

/// Push-id generator: 8 timestamp characters followed by 12 random
/// characters over a lexicographic alphabet, so ids sort by creation
/// time. Ids minted in the same millisecond increment the random tail to
/// stay strictly ordered.
#[derive(Default)]
struct KeyGen {
    last_ms: i64,
    last_tail: [u8; 12],
}

impl KeyGen {
    fn next(&mut self, now: i64) -> String {
        if now == self.last_ms {
            for slot in self.last_tail.iter_mut().rev() {
                if *slot < 63 {
                    *slot += 1;
                    break;
                }
                *slot = 0;
            }
        } else {
            self.last_ms = now;
            let mut rng = rand::thread_rng();
            for slot in self.last_tail.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }

        let mut id = vec![0u8; 20];
        let mut ts = now;
        for slot in id[..8].iter_mut().rev() {
            *slot = PUSH_ALPHABET[(ts % 64) as usize];
            ts /= 64;
        }
        for (slot, tail) in id[8..].iter_mut().zip(self.last_tail.iter()) {
            *slot = PUSH_ALPHABET[*tail as usize];
        }
        String::from_utf8(id).expect("push id alphabet is ascii")
    }
}
