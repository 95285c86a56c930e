//! JSON snapshot persistence
//!
//! Durable store backed by a single JSON file. The on-disk layout is a map of
//! chat id (decimal string) to a map of topic id (decimal string, or the
//! literal sentinel `"none"` for "no topic configured") to the settings
//! record. The sentinel round-trips exactly and is distinct from `"0"`.
//!
//! Writes go to a temp file in the same directory followed by a rename, so a
//! crash mid-write never leaves a truncated snapshot behind.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::TannoyError;
use crate::store::{AnnouncementSettings, ChatKey, DurableStore};

/// Sentinel topic key for "no topic configured".
const TOPIC_NONE: &str = "none";

/// File-backed durable store holding one JSON snapshot.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Conventional snapshot location inside a data directory.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("announcements.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// On-disk shape: chat id string -> topic string -> record. BTreeMap keeps
/// the output stable across writes.
type DiskLayout = BTreeMap<String, BTreeMap<String, AnnouncementSettings>>;

fn encode(records: &HashMap<ChatKey, AnnouncementSettings>) -> DiskLayout {
    let mut layout = DiskLayout::new();
    for (key, settings) in records {
        let topic = match key.topic_id {
            Some(id) => id.to_string(),
            None => TOPIC_NONE.to_string(),
        };
        layout
            .entry(key.chat_id.to_string())
            .or_default()
            .insert(topic, settings.clone());
    }
    layout
}

fn decode(layout: DiskLayout) -> HashMap<ChatKey, AnnouncementSettings> {
    let mut records = HashMap::new();
    for (chat_str, topics) in layout {
        let Ok(chat_id) = chat_str.parse::<i64>() else {
            warn!("Skipping persisted entry with invalid chat id {:?}", chat_str);
            continue;
        };
        for (topic_str, settings) in topics {
            let topic_id = if topic_str == TOPIC_NONE {
                None
            } else {
                match topic_str.parse::<i64>() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        warn!(
                            "Skipping persisted entry with invalid topic id {:?} in chat {}",
                            topic_str, chat_id
                        );
                        continue;
                    }
                }
            };
            records.insert(ChatKey::new(chat_id, topic_id), settings);
        }
    }
    records
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn write(
        &self,
        records: &HashMap<ChatKey, AnnouncementSettings>,
    ) -> Result<(), TannoyError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TannoyError::Persistence(format!("Failed to create data directory: {}", e))
            })?;
        }

        let layout = encode(records);
        let json = serde_json::to_vec_pretty(&layout)
            .map_err(|e| TannoyError::Persistence(format!("Failed to serialize snapshot: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(|e| {
            TannoyError::Persistence(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            TannoyError::Persistence(format!("Failed to rename snapshot into place: {}", e))
        })?;

        debug!("Persisted {} chat(s) to {}", layout.len(), self.path.display());
        Ok(())
    }

    async fn read(&self) -> Result<Option<HashMap<ChatKey, AnnouncementSettings>>, TannoyError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TannoyError::Persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let layout: DiskLayout = serde_json::from_slice(&contents).map_err(|e| {
            TannoyError::Persistence(format!("Malformed snapshot {}: {}", self.path.display(), e))
        })?;

        Ok(Some(decode(layout)))
    }
}
