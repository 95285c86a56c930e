//! Recurring job scheduler
//!
//! Maintains at most one recurring timer per [`ChatKey`]. Each job is its own
//! tokio task, so a slow delivery for one key never blocks ticks for another.
//! Within a key the runner is awaited inline on the job task, which rules out
//! two overlapping deliveries for the same key.
//!
//! `add_or_replace` aborts the previous task before inserting the new handle,
//! so replacement is atomic from the map's point of view: there is never a
//! window with two installed timers for one key. Replacement resets the
//! phase — the first fire of the new job is one full period after install.
//! A tick already in flight when its job is removed may still run once; the
//! runner re-checks the `active` flag before sending, which makes that race
//! a no-op.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::store::ChatKey;

/// Work executed at each interval elapse.
///
/// Implementations look up current state by key at fire time; they must never
/// close over settings captured at install time, or edits made while the job
/// is active would be lost.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, key: ChatKey);
}

/// Keyed set of recurring timers.
pub struct JobScheduler {
    jobs: Mutex<HashMap<ChatKey, JoinHandle<()>>>,
    runner: Arc<dyn JobRunner>,
}

impl JobScheduler {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            runner,
        }
    }

    /// Install a recurring timer for `key`, superseding any existing one.
    pub async fn add_or_replace(&self, key: ChatKey, period_minutes: u64) {
        // Interval input is validated at the dialog boundary; clamp here so a
        // bad persisted value can never produce a zero-period timer. The
        // seconds conversion saturates: an interval near u64::MAX would
        // otherwise overflow and wrap to a rapid-fire period.
        let minutes = period_minutes.max(1);
        self.install(key, Duration::from_secs(minutes.saturating_mul(60)))
            .await;
        info!("Installed job for {} every {} minute(s)", key, minutes);
    }

    /// Install a timer with an explicit period. Split out from
    /// `add_or_replace` so tests can run sub-second periods.
    pub(crate) async fn install(&self, key: ChatKey, period: Duration) {
        let runner = Arc::clone(&self.runner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately;
            // consume it so the first fire is one full period after install.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                runner.run(key).await;
            }
        });

        let mut jobs = self.jobs.lock().await;
        if let Some(old) = jobs.insert(key, handle) {
            old.abort();
            debug!("Replaced existing job for {}", key);
        }
    }

    /// Cancel the timer for `key`. No-op if absent.
    pub async fn remove(&self, key: ChatKey) {
        let mut jobs = self.jobs.lock().await;
        if let Some(handle) = jobs.remove(&key) {
            handle.abort();
            info!("Removed job for {}", key);
        }
    }

    /// Whether a timer is installed for `key`.
    pub async fn exists(&self, key: ChatKey) -> bool {
        self.jobs.lock().await.contains_key(&key)
    }

    /// Keys with an installed timer, for diagnostics.
    pub async fn active_keys(&self) -> Vec<ChatKey> {
        self.jobs.lock().await.keys().copied().collect()
    }

    /// Abort every timer. No new ticks start after this returns; a tick
    /// already inside the runner is not awaited.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        let count = jobs.len();
        for (_, handle) in jobs.drain() {
            handle.abort();
        }
        if count > 0 {
            info!("Stopped {} scheduled job(s)", count);
        }
    }
}
