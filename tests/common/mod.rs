//! Shared test doubles: a recording transport and an in-memory durable store.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use tannoy::bot::{MenuButton, Transport};
use tannoy::delivery::Announcer;
use tannoy::dialog::DialogEngine;
use tannoy::errors::TannoyError;
use tannoy::scheduler::JobScheduler;
use tannoy::store::{AnnouncementSettings, ChatKey, DurableStore, SettingsStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub topic_id: Option<i64>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RenderedMenu {
    pub chat_id: i64,
    pub surface: Option<i64>,
    pub text: String,
    pub choices: Vec<String>,
}

/// Transport double that records all outbound traffic.
pub struct MockTransport {
    pub sent: Mutex<Vec<SentMessage>>,
    pub menus: Mutex<Vec<RenderedMenu>>,
    fail_sends: AtomicBool,
    next_message_id: AtomicI64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            menus: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            next_message_id: AtomicI64::new(1000),
        }
    }

    /// Make every subsequent send/render fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn rendered_menus(&self) -> Vec<RenderedMenu> {
        self.menus.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        chat_id: i64,
        topic_id: Option<i64>,
        text: &str,
    ) -> Result<(), TannoyError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TannoyError::Transport("mock send refused".into()));
        }
        self.sent.lock().await.push(SentMessage {
            chat_id,
            topic_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn render_menu(
        &self,
        chat_id: i64,
        surface: Option<i64>,
        text: &str,
        buttons: &[MenuButton],
    ) -> Result<i64, TannoyError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TannoyError::Transport("mock render refused".into()));
        }
        let message_id =
            surface.unwrap_or_else(|| self.next_message_id.fetch_add(1, Ordering::SeqCst));
        self.menus.lock().await.push(RenderedMenu {
            chat_id,
            surface,
            text: text.to_string(),
            choices: buttons.iter().map(|b| b.choice.to_string()).collect(),
        });
        Ok(message_id)
    }
}

/// In-memory durable store.
pub struct MemoryStore {
    data: Mutex<Option<HashMap<ChatKey, AnnouncementSettings>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn write(
        &self,
        records: &HashMap<ChatKey, AnnouncementSettings>,
    ) -> Result<(), TannoyError> {
        *self.data.lock().await = Some(records.clone());
        Ok(())
    }

    async fn read(&self) -> Result<Option<HashMap<ChatKey, AnnouncementSettings>>, TannoyError> {
        Ok(self.data.lock().await.clone())
    }
}

/// Fully wired component graph over mock collaborators.
pub struct Harness {
    pub store: Arc<SettingsStore>,
    pub scheduler: Arc<JobScheduler>,
    pub dialog: Arc<DialogEngine>,
    pub transport: Arc<MockTransport>,
}

pub fn harness() -> Harness {
    let store = Arc::new(SettingsStore::new(Arc::new(MemoryStore::new())));
    let transport = Arc::new(MockTransport::new());
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
    Harness {
        store,
        scheduler,
        dialog,
        transport,
    }
}
