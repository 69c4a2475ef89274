//! Subscription Store
//!
//! Saved keywords per user and channel, used by the fan-out query. The
//! primary key is `(user_id, channel_id, keyword)`; listing returns a
//! user's keywords in registration order.
//!
//! Two implementations:
//! - [`MemorySubscriptionStore`]: process-local, lost on restart
//! - [`JsonFileSubscriptionStore`]: the memory store persisted as pretty
//!   JSON after every mutation

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("subscription file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not valid subscription JSON
    #[error("subscription file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Subscriptions could not be serialized
    #[error("failed to serialize subscriptions: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One saved keyword
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: String,
    /// Channel key (see [`crate::chat::InboundMessage::channel_key`])
    pub channel_id: String,
    pub keyword: String,
    /// Registration time, milliseconds since the Unix epoch
    pub created_at: i64,
}

impl Subscription {
    /// New subscription registered now
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        keyword: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            keyword: keyword.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    fn same_key(&self, other: &Self) -> bool {
        self.user_id == other.user_id
            && self.channel_id == other.channel_id
            && self.keyword == other.keyword
    }

    fn in_scope(&self, user_id: &str, channel_id: &str) -> bool {
        self.user_id == user_id && self.channel_id == channel_id
    }
}

/// Persistence for saved keywords
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert, or replace the row with the same key
    async fn upsert(&self, subscription: Subscription) -> Result<(), StoreError>;

    /// A user's subscriptions in one channel, oldest first
    async fn list(&self, user_id: &str, channel_id: &str) -> Result<Vec<Subscription>, StoreError>;

    /// Remove one keyword; `false` if it was not subscribed
    async fn remove(&self, user_id: &str, channel_id: &str, keyword: &str)
        -> Result<bool, StoreError>;

    /// Remove every keyword of a user in one channel, returning how many
    async fn remove_all(&self, user_id: &str, channel_id: &str) -> Result<usize, StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    rows: RwLock<Vec<Subscription>>,
}

impl MemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with `rows`
    #[must_use]
    pub fn with_rows(rows: Vec<Subscription>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Copy of every row, in insertion order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.rows.read().clone()
    }

    fn upsert_sync(&self, subscription: Subscription) {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|r| r.same_key(&subscription)) {
            Some(existing) => *existing = subscription,
            None => rows.push(subscription),
        }
    }

    fn list_sync(&self, user_id: &str, channel_id: &str) -> Vec<Subscription> {
        let mut found: Vec<Subscription> = self
            .rows
            .read()
            .iter()
            .filter(|r| r.in_scope(user_id, channel_id))
            .cloned()
            .collect();
        // stable, so equal timestamps keep insertion order
        found.sort_by_key(|r| r.created_at);
        found
    }

    fn remove_sync(&self, user_id: &str, channel_id: &str, keyword: &str) -> bool {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|r| !(r.in_scope(user_id, channel_id) && r.keyword == keyword));
        rows.len() != before
    }

    fn remove_all_sync(&self, user_id: &str, channel_id: &str) -> usize {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|r| !r.in_scope(user_id, channel_id));
        before - rows.len()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn upsert(&self, subscription: Subscription) -> Result<(), StoreError> {
        self.upsert_sync(subscription);
        Ok(())
    }

    async fn list(&self, user_id: &str, channel_id: &str) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.list_sync(user_id, channel_id))
    }

    async fn remove(
        &self,
        user_id: &str,
        channel_id: &str,
        keyword: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.remove_sync(user_id, channel_id, keyword))
    }

    async fn remove_all(&self, user_id: &str, channel_id: &str) -> Result<usize, StoreError> {
        Ok(self.remove_all_sync(user_id, channel_id))
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Memory store mirrored to a JSON file
#[derive(Debug)]
pub struct JsonFileSubscriptionStore {
    path: PathBuf,
    memory: MemorySubscriptionStore,
    /// Serializes mutate-then-write so the file matches the last mutation
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileSubscriptionStore {
    /// Open `path`, starting empty if the file does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let rows: Vec<Subscription> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        tracing::info!(path = %path.display(), count = rows.len(), "Loaded subscriptions");

        Ok(Self {
            path,
            memory: MemorySubscriptionStore::with_rows(rows),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.memory.snapshot())?;
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for JsonFileSubscriptionStore {
    async fn upsert(&self, subscription: Subscription) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.memory.upsert_sync(subscription);
        self.persist().await
    }

    async fn list(&self, user_id: &str, channel_id: &str) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.memory.list_sync(user_id, channel_id))
    }

    async fn remove(
        &self,
        user_id: &str,
        channel_id: &str,
        keyword: &str,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let removed = self.memory.remove_sync(user_id, channel_id, keyword);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn remove_all(&self, user_id: &str, channel_id: &str) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let removed = self.memory.remove_all_sync(user_id, channel_id);
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }
}
