//! Settings store
//!
//! In-memory mapping from (chat, topic) to announcement settings, guarded by
//! a single async mutex. The store exclusively owns the records; the dialog
//! and the delivery path both mutate them through [`SettingsStore::update`],
//! which keeps every read-modify-write sequence under the lock.
//!
//! Persistence goes through the [`DurableStore`] collaborator. Writes operate
//! on a snapshot taken under the lock, so collaborator I/O never happens with
//! the settings lock held. A persistence failure is logged and swallowed: the
//! in-memory state stays authoritative for the process lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::errors::TannoyError;

pub mod file;

pub use file::JsonFileStore;

/// Default announcement body before the user sets one.
pub const DEFAULT_TEXT: &str = "No message set.";

/// Default repeat interval in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;

/// Key identifying one announcement target.
///
/// `topic_id: None` means "no topic configured" — a distinct, storable value,
/// not an error. It persists as the literal sentinel `"none"`, which never
/// collides with topic id `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub chat_id: i64,
    pub topic_id: Option<i64>,
}

impl ChatKey {
    pub fn new(chat_id: i64, topic_id: Option<i64>) -> Self {
        Self { chat_id, topic_id }
    }
}

impl std::fmt::Display for ChatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.topic_id {
            Some(topic) => write!(f, "{}/{}", self.chat_id, topic),
            None => write!(f, "{}/none", self.chat_id),
        }
    }
}

/// Per-key announcement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementSettings {
    /// Message body delivered at each interval elapse
    #[serde(default = "default_text")]
    pub text: String,

    /// Repeat interval in minutes, always >= 1
    #[serde(rename = "interval", default = "default_interval")]
    pub interval_minutes: u64,

    /// Whether a scheduler job is installed for this key
    #[serde(default)]
    pub active: bool,

    /// Suppress menu rendering on subsequent /start
    #[serde(default)]
    pub hide_menu: bool,

    /// Time of the last successful delivery
    #[serde(default)]
    pub last_sent: Option<DateTime<Utc>>,
}

fn default_text() -> String {
    DEFAULT_TEXT.to_string()
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

impl Default for AnnouncementSettings {
    fn default() -> Self {
        Self {
            text: default_text(),
            interval_minutes: default_interval(),
            active: false,
            hide_menu: false,
            last_sent: None,
        }
    }
}

/// Durable persistence collaborator.
///
/// The store writes full snapshots and reads them back on startup; there is
/// no incremental update protocol. `read` returns `None` when nothing has
/// been persisted yet.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn write(
        &self,
        records: &HashMap<ChatKey, AnnouncementSettings>,
    ) -> Result<(), TannoyError>;

    async fn read(&self) -> Result<Option<HashMap<ChatKey, AnnouncementSettings>>, TannoyError>;
}

/// Owner of all announcement settings records.
pub struct SettingsStore {
    records: Mutex<HashMap<ChatKey, AnnouncementSettings>>,
    durable: Arc<dyn DurableStore>,
}

impl SettingsStore {
    pub fn new(durable: Arc<dyn DurableStore>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            durable,
        }
    }

    /// Returns the record for `key`, inserting a default one if missing.
    ///
    /// Idempotent: repeated calls with the same key return the same record,
    /// never a fresh default over an existing one.
    pub async fn get_or_create(&self, key: ChatKey) -> AnnouncementSettings {
        let mut records = self.records.lock().await;
        records.entry(key).or_default().clone()
    }

    /// Returns the record for `key` if one exists.
    pub async fn get(&self, key: ChatKey) -> Option<AnnouncementSettings> {
        let records = self.records.lock().await;
        records.get(&key).cloned()
    }

    /// Read-modify-write under the store lock; returns the updated record.
    ///
    /// Creates the record first if missing, so the mutation always applies to
    /// a real entry.
    pub async fn update<F>(&self, key: ChatKey, f: F) -> AnnouncementSettings
    where
        F: FnOnce(&mut AnnouncementSettings),
    {
        let mut records = self.records.lock().await;
        let entry = records.entry(key).or_default();
        f(entry);
        entry.clone()
    }

    /// Clone-out of the full record map for lock-free persistence I/O.
    pub async fn snapshot(&self) -> HashMap<ChatKey, AnnouncementSettings> {
        self.records.lock().await.clone()
    }

    /// Persist every record to the durable collaborator.
    ///
    /// Failure is logged, never fatal — the in-memory state remains the
    /// source of truth and no retry is scheduled.
    pub async fn persist_all(&self) {
        let snapshot = self.snapshot().await;
        if let Err(e) = self.durable.write(&snapshot).await {
            error!("Failed to persist announcement settings: {}", e);
        }
    }

    /// Load records from the durable collaborator.
    ///
    /// Malformed or missing persisted data yields an empty store. Returns the
    /// (key, interval) pairs of every record with `active == true`, so the
    /// caller can reinstall their scheduler jobs.
    pub async fn restore_all(&self) -> Vec<(ChatKey, u64)> {
        let loaded = match self.durable.read().await {
            Ok(Some(records)) => records,
            Ok(None) => {
                info!("No persisted announcement settings found, starting empty");
                HashMap::new()
            }
            Err(e) => {
                warn!("Failed to restore announcement settings, starting empty: {}", e);
                HashMap::new()
            }
        };

        let active: Vec<(ChatKey, u64)> = loaded
            .iter()
            .filter(|(_, s)| s.active)
            .map(|(k, s)| (*k, s.interval_minutes))
            .collect();

        info!(
            "Restored {} announcement record(s), {} active",
            loaded.len(),
            active.len()
        );

        let mut records = self.records.lock().await;
        *records = loaded;
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory durable store for exercising persist/restore without disk.
    pub struct MemoryStore {
        data: Mutex<Option<HashMap<ChatKey, AnnouncementSettings>>>,
        fail_writes: bool,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self {
                data: Mutex::new(None),
                fail_writes: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                data: Mutex::new(None),
                fail_writes: true,
            }
        }
    }

    #[async_trait]
    impl DurableStore for MemoryStore {
        async fn write(
            &self,
            records: &HashMap<ChatKey, AnnouncementSettings>,
        ) -> Result<(), TannoyError> {
            if self.fail_writes {
                return Err(TannoyError::Persistence("write refused".into()));
            }
            *self.data.lock().await = Some(records.clone());
            Ok(())
        }

        async fn read(
            &self,
        ) -> Result<Option<HashMap<ChatKey, AnnouncementSettings>>, TannoyError> {
            Ok(self.data.lock().await.clone())
        }
    }

    #[tokio::test]
    async fn test_get_or_create_inserts_defaults() {
        let store = SettingsStore::new(Arc::new(MemoryStore::new()));
        let key = ChatKey::new(100, Some(7));

        let settings = store.get_or_create(key).await;
        assert_eq!(settings.text, DEFAULT_TEXT);
        assert_eq!(settings.interval_minutes, DEFAULT_INTERVAL_MINUTES);
        assert!(!settings.active);
        assert!(!settings.hide_menu);
        assert!(settings.last_sent.is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = SettingsStore::new(Arc::new(MemoryStore::new()));
        let key = ChatKey::new(100, None);

        store
            .update(key, |s| s.text = "hello".to_string())
            .await;

        // A second get_or_create must return the mutated record, not a
        // fresh default.
        let settings = store.get_or_create(key).await;
        assert_eq!(settings.text, "hello");
    }

    #[tokio::test]
    async fn test_update_returns_mutated_record() {
        let store = SettingsStore::new(Arc::new(MemoryStore::new()));
        let key = ChatKey::new(1, Some(2));

        let updated = store.update(key, |s| s.interval_minutes = 42).await;
        assert_eq!(updated.interval_minutes, 42);
        assert_eq!(store.get(key).await.unwrap().interval_minutes, 42);
    }

    #[tokio::test]
    async fn test_none_and_zero_topics_are_distinct_keys() {
        let store = SettingsStore::new(Arc::new(MemoryStore::new()));
        let none_key = ChatKey::new(100, None);
        let zero_key = ChatKey::new(100, Some(0));

        store.update(none_key, |s| s.text = "none".to_string()).await;
        store.update(zero_key, |s| s.text = "zero".to_string()).await;

        assert_eq!(store.get(none_key).await.unwrap().text, "none");
        assert_eq!(store.get(zero_key).await.unwrap().text, "zero");
    }

    #[tokio::test]
    async fn test_persist_and_restore_round_trip() {
        let durable = Arc::new(MemoryStore::new());
        let store = SettingsStore::new(Arc::clone(&durable) as Arc<dyn DurableStore>);
        let key = ChatKey::new(100, None);

        store
            .update(key, |s| {
                s.text = "hi".to_string();
                s.interval_minutes = 5;
                s.active = true;
            })
            .await;
        store.persist_all().await;

        let restored = SettingsStore::new(durable);
        let active = restored.restore_all().await;

        assert_eq!(active, vec![(key, 5)]);
        let record = restored.get(key).await.unwrap();
        assert_eq!(record.text, "hi");
        assert!(record.active);
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_in_memory_state() {
        let store = SettingsStore::new(Arc::new(MemoryStore::failing()));
        let key = ChatKey::new(5, Some(1));

        store.update(key, |s| s.text = "kept".to_string()).await;
        store.persist_all().await;

        assert_eq!(store.get(key).await.unwrap().text, "kept");
    }

    #[tokio::test]
    async fn test_restore_with_no_data_yields_empty_store() {
        let store = SettingsStore::new(Arc::new(MemoryStore::new()));
        let active = store.restore_all().await;
        assert!(active.is_empty());
        assert!(store.snapshot().await.is_empty());
    }
}
