//! Daemon lifecycle management
//!
//! Wires the components together and drives the process lifecycle:
//!
//! 1. `startup()` restores persisted settings and reinstalls a scheduler job
//!    for every record that was active when the process last ran.
//! 2. `run()` spawns the Telegram long-poll loop and waits for ctrl-c.
//! 3. `shutdown()` stops the scheduler (no new ticks; in-flight deliveries
//!    are not awaited) and flushes a final persistence snapshot.
//!
//! Startup problems are logged critically but shutdown is still attempted,
//! so a half-started process never leaves timers running.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use crate::bot::{TelegramTransport, Transport};
use crate::config::Config;
use crate::delivery::Announcer;
use crate::dialog::DialogEngine;
use crate::errors::TannoyError;
use crate::scheduler::JobScheduler;
use crate::store::{JsonFileStore, SettingsStore};

pub struct Daemon {
    store: Arc<SettingsStore>,
    scheduler: Arc<JobScheduler>,
    dialog: Arc<DialogEngine>,
    transport: Arc<TelegramTransport>,
}

impl Daemon {
    /// Build the component graph from configuration.
    pub fn new(config: &Config) -> Result<Self, TannoyError> {
        let token = config.bot_token()?;

        let durable = Arc::new(JsonFileStore::in_dir(&config.data_dir()));
        let store = Arc::new(SettingsStore::new(durable));

        let transport = Arc::new(TelegramTransport::new(
            token,
            config.telegram.allowed_users.clone(),
            config.telegram.poll_timeout_secs,
        ));

        let announcer = Arc::new(Announcer::new(
            Arc::clone(&store),
            Arc::clone(&transport) as Arc<dyn Transport>,
        ));
        let scheduler = Arc::new(JobScheduler::new(announcer));

        let dialog = Arc::new(DialogEngine::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            Arc::clone(&transport) as Arc<dyn Transport>,
        ));

        Ok(Self {
            store,
            scheduler,
            dialog,
            transport,
        })
    }

    /// Restore persisted settings and reinstall jobs for active records.
    pub async fn startup(&self) {
        let active = self.store.restore_all().await;
        for (key, interval_minutes) in active {
            self.scheduler.add_or_replace(key, interval_minutes).await;
        }
    }

    /// Run until ctrl-c or the poll loop dies, then shut down.
    pub async fn run(&self) -> Result<()> {
        let transport = Arc::clone(&self.transport);
        let dialog = Arc::clone(&self.dialog);
        let poller = tokio::spawn(async move {
            transport.run_polling(dialog).await;
        });

        info!("Tannoy is running. Press ctrl-c to stop.");
        self.supervise(poller).await;
        self.shutdown().await;
        Ok(())
    }

    /// Wait for either a shutdown signal or poller exit. A poll loop that
    /// stops is a fault: without it the process would keep firing timers
    /// while no longer responding to anyone.
    async fn supervise(&self, mut poller: tokio::task::JoinHandle<()>) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received");
                poller.abort();
            }
            result = &mut poller => {
                match result {
                    Ok(()) => error!("Update poller exited unexpectedly; shutting down"),
                    Err(e) => error!("Update poller task failed: {}; shutting down", e),
                }
            }
        }
    }

    /// Stop the scheduler and flush a final snapshot.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.store.persist_all().await;
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AnnouncementSettings, ChatKey, DurableStore};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.core.data_dir = dir.path().to_path_buf();
        config.telegram.token = "123:test".to_string();
        config
    }

    #[tokio::test]
    async fn test_startup_reinstalls_active_jobs() {
        let dir = TempDir::new().unwrap();

        // Seed a snapshot with one active and one inactive record.
        let seed = JsonFileStore::in_dir(dir.path());
        let mut records = HashMap::new();
        records.insert(
            ChatKey::new(100, None),
            AnnouncementSettings {
                text: "hi".to_string(),
                active: true,
                ..Default::default()
            },
        );
        records.insert(
            ChatKey::new(200, Some(3)),
            AnnouncementSettings::default(),
        );
        seed.write(&records).await.unwrap();

        let daemon = Daemon::new(&test_config(&dir)).unwrap();
        daemon.startup().await;

        assert!(daemon.scheduler.exists(ChatKey::new(100, None)).await);
        assert!(!daemon.scheduler.exists(ChatKey::new(200, Some(3))).await);
        assert_eq!(
            daemon.store.get(ChatKey::new(100, None)).await.unwrap().text,
            "hi"
        );

        daemon.shutdown().await;
        assert!(daemon.scheduler.active_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_startup_with_empty_data_dir() {
        let dir = TempDir::new().unwrap();
        let daemon = Daemon::new(&test_config(&dir)).unwrap();
        daemon.startup().await;
        assert!(daemon.scheduler.active_keys().await.is_empty());
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_poller_triggers_shutdown() {
        let dir = TempDir::new().unwrap();
        let daemon = Daemon::new(&test_config(&dir)).unwrap();
        daemon.startup().await;

        // A poll loop that returns must unblock run() instead of leaving
        // the daemon waiting on ctrl-c forever.
        let poller = tokio::spawn(async {});
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            daemon.supervise(poller),
        )
        .await
        .expect("supervise did not notice the dead poller");

        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_snapshot() {
        let dir = TempDir::new().unwrap();
        let daemon = Daemon::new(&test_config(&dir)).unwrap();
        daemon.startup().await;

        daemon
            .store
            .update(ChatKey::new(7, Some(1)), |s| s.text = "flushed".to_string())
            .await;
        daemon.shutdown().await;

        let reader = JsonFileStore::in_dir(dir.path());
        let records = reader.read().await.unwrap().unwrap();
        assert_eq!(records[&ChatKey::new(7, Some(1))].text, "flushed");
    }
}
