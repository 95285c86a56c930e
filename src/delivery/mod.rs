//! Announcement delivery path
//!
//! Invoked by the scheduler at each interval elapse. Settings are re-read
//! from the store at fire time, never captured at install time, so message
//! and interval edits made while a job is active always take effect. A tick
//! that races a cancellation finds `active == false` and becomes a no-op.
//!
//! Transport failures are logged and swallowed: a missed delivery neither
//! cancels the job nor marks the announcement inactive.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::bot::Transport;
use crate::scheduler::JobRunner;
use crate::store::{ChatKey, SettingsStore};

/// Sent instead of the configured text when no topic is configured, so a
/// misconfigured active announcement surfaces loudly rather than dropping
/// silently.
pub const NO_TOPIC_WARNING: &str =
    "No topic set. Open the menu with /start and choose Set topic.";

pub struct Announcer {
    store: Arc<SettingsStore>,
    transport: Arc<dyn Transport>,
}

impl Announcer {
    pub fn new(store: Arc<SettingsStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Deliver the configured announcement for `key`.
    pub async fn deliver(&self, key: ChatKey) {
        let Some(settings) = self.store.get(key).await else {
            debug!("Tick for {} with no settings record, skipping", key);
            return;
        };

        if !settings.active {
            debug!("Tick for {} while inactive, skipping", key);
            return;
        }

        let result = match key.topic_id {
            Some(topic) => {
                self.transport
                    .send(key.chat_id, Some(topic), &settings.text)
                    .await
            }
            None => self.transport.send(key.chat_id, None, NO_TOPIC_WARNING).await,
        };

        match result {
            Ok(()) => {
                info!("Delivered announcement for {}", key);
                self.store
                    .update(key, |s| s.last_sent = Some(Utc::now()))
                    .await;
                self.store.persist_all().await;
            }
            Err(e) => {
                // Leave the job installed; the next tick will retry.
                error!("Failed to deliver announcement for {}: {}", key, e);
            }
        }
    }
}

#[async_trait]
impl JobRunner for Announcer {
    async fn run(&self, key: ChatKey) {
        self.deliver(key).await;
    }
}
