//! Configuration dialog state machine
//!
//! Per-chat conversational flow that collects topic, message, and interval
//! edits and keeps the settings store and the job scheduler consistent. Each
//! chat has at most one [`DialogSession`], created on `/start` and destroyed
//! when the flow reaches a terminal state; everything a session holds is
//! reconstructible from the settings store, so losing one is harmless.
//!
//! The menu is rendered through the transport and edited in place when the
//! previously shown menu message is still editable. After every mutating
//! transition the store persists a snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bot::{MenuButton, ReplyAnchor, Transport};
use crate::scheduler::JobScheduler;
use crate::store::{AnnouncementSettings, ChatKey, SettingsStore};

/// Dialog flow states. `Ended` is terminal: the session is removed and no
/// further input is expected until the next `/start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    MainMenu,
    AwaitingTopic,
    AwaitingMessage,
    AwaitingInterval,
    Ended,
}

/// In-progress configuration flow for one chat.
#[derive(Debug, Clone)]
struct DialogSession {
    state: DialogState,
    /// Handle of the currently displayed menu message, for in-place edits
    menu_message: Option<i64>,
    /// Topic currently being configured (the settings-key topic part)
    topic_id: Option<i64>,
}

/// Menu options, one row per button.
const MENU_BUTTONS: &[MenuButton] = &[
    MenuButton::new("Set topic", "set_topic"),
    MenuButton::new("Set message", "set_message"),
    MenuButton::new("Set interval", "set_interval"),
    MenuButton::new("Start announcements", "start"),
    MenuButton::new("Stop announcements", "stop"),
    MenuButton::new("Hide menu", "hide"),
    MenuButton::new("Quit", "quit"),
];

pub struct DialogEngine {
    sessions: Mutex<HashMap<i64, DialogSession>>,
    store: Arc<SettingsStore>,
    scheduler: Arc<JobScheduler>,
    transport: Arc<dyn Transport>,
}

impl DialogEngine {
    pub fn new(
        store: Arc<SettingsStore>,
        scheduler: Arc<JobScheduler>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            scheduler,
            transport,
        }
    }

    /// `/start`: (re)enter the main menu for the (chat, topic) pair derived
    /// from the triggering context. Re-entrant from any state.
    pub async fn on_command_start(&self, chat_id: i64, topic_id: Option<i64>) -> DialogState {
        {
            let mut sessions = self.sessions.lock().await;
            // Keep the old menu surface if there is one, so re-entry edits
            // the existing menu instead of stacking a new one.
            let menu_message = sessions.get(&chat_id).and_then(|s| s.menu_message);
            sessions.insert(
                chat_id,
                DialogSession {
                    state: DialogState::MainMenu,
                    menu_message,
                    topic_id,
                },
            );
        }

        self.store
            .get_or_create(ChatKey::new(chat_id, topic_id))
            .await;
        self.render_menu(chat_id, None).await;
        DialogState::MainMenu
    }

    /// `/status`: stateless report of the current settings. Does not touch
    /// any in-progress dialog session.
    pub async fn on_command_status(&self, chat_id: i64, topic_id: Option<i64>) -> String {
        let key = ChatKey::new(chat_id, topic_id);
        match self.store.get(key).await {
            Some(settings) => status_text(key, &settings),
            None => "No announcement configured for this chat yet. Use /start to set one up."
                .to_string(),
        }
    }

    /// Menu button selections.
    pub async fn on_button(&self, chat_id: i64, choice: &str) -> DialogState {
        let Some((topic_id, state)) = self.session_view(chat_id).await else {
            // Buttons on a menu from a previous process lifetime; the session
            // behind it is gone.
            self.send_note(chat_id, "Open the menu with /start first.").await;
            return DialogState::Ended;
        };
        let key = ChatKey::new(chat_id, topic_id);

        match choice {
            "set_topic" => {
                self.prompt(
                    chat_id,
                    DialogState::AwaitingTopic,
                    "Reply to any message inside the target topic and I will announce there.",
                )
                .await
            }
            "set_message" => {
                self.prompt(
                    chat_id,
                    DialogState::AwaitingMessage,
                    "Send the new announcement text.",
                )
                .await
            }
            "set_interval" => {
                self.prompt(
                    chat_id,
                    DialogState::AwaitingInterval,
                    "Send the repeat interval in minutes (a whole number, at least 1).",
                )
                .await
            }
            "start" => {
                let settings = self.store.update(key, |s| s.active = true).await;
                // Job existence is always re-derived from the active flag,
                // never from what the scheduler previously held.
                self.scheduler
                    .add_or_replace(key, settings.interval_minutes)
                    .await;
                self.store.persist_all().await;
                self.set_state(chat_id, DialogState::MainMenu).await;
                self.render_menu(chat_id, Some("Announcements started.")).await;
                DialogState::MainMenu
            }
            "stop" => {
                self.store.update(key, |s| s.active = false).await;
                self.scheduler.remove(key).await;
                self.store.persist_all().await;
                self.set_state(chat_id, DialogState::MainMenu).await;
                self.render_menu(chat_id, Some("Announcements stopped.")).await;
                DialogState::MainMenu
            }
            "hide" => {
                self.store.update(key, |s| s.hide_menu = true).await;
                self.store.persist_all().await;
                self.send_note(
                    chat_id,
                    "Menu hidden. /start will no longer show it; /status still reports settings.",
                )
                .await;
                self.end_session(chat_id).await;
                DialogState::Ended
            }
            "quit" => {
                self.send_note(chat_id, "Closed. Announcements keep running as configured.")
                    .await;
                self.end_session(chat_id).await;
                DialogState::Ended
            }
            other => {
                warn!("Unknown menu choice {:?} in chat {}", other, chat_id);
                state
            }
        }
    }

    /// Free-text input, dispatched on the session's current state.
    pub async fn on_text(
        &self,
        chat_id: i64,
        text: &str,
        anchor: Option<ReplyAnchor>,
    ) -> DialogState {
        let Some((topic_id, state)) = self.session_view(chat_id).await else {
            debug!("Text in chat {} with no dialog session, ignoring", chat_id);
            return DialogState::Ended;
        };
        let key = ChatKey::new(chat_id, topic_id);

        match state {
            DialogState::AwaitingTopic => match anchor {
                None => {
                    self.send_note(
                        chat_id,
                        "That was not a reply. Reply to a message inside the target topic to select it.",
                    )
                    .await;
                    self.set_state(chat_id, DialogState::MainMenu).await;
                    self.render_menu(chat_id, None).await;
                    DialogState::MainMenu
                }
                Some(anchor) => {
                    {
                        let mut sessions = self.sessions.lock().await;
                        if let Some(session) = sessions.get_mut(&chat_id) {
                            session.topic_id = anchor.thread_id;
                            session.state = DialogState::MainMenu;
                        }
                    }
                    self.store
                        .get_or_create(ChatKey::new(chat_id, anchor.thread_id))
                        .await;
                    self.store.persist_all().await;
                    self.render_menu(chat_id, Some("Topic updated.")).await;
                    DialogState::MainMenu
                }
            },
            DialogState::AwaitingMessage => {
                let body = text.to_string();
                self.store.update(key, |s| s.text = body).await;
                self.store.persist_all().await;
                self.set_state(chat_id, DialogState::MainMenu).await;
                self.render_menu(chat_id, Some("Message updated.")).await;
                DialogState::MainMenu
            }
            DialogState::AwaitingInterval => match text.trim().parse::<u64>() {
                Ok(minutes) if minutes >= 1 => {
                    let settings = self
                        .store
                        .update(key, |s| s.interval_minutes = minutes)
                        .await;
                    if settings.active {
                        // Replace with the new period. The fresh timer resets
                        // the phase; the next fire is one full period away.
                        self.scheduler.add_or_replace(key, minutes).await;
                    }
                    self.store.persist_all().await;
                    self.set_state(chat_id, DialogState::MainMenu).await;
                    self.render_menu(
                        chat_id,
                        Some(&format!("Interval set to every {} minute(s).", minutes)),
                    )
                    .await;
                    DialogState::MainMenu
                }
                _ => {
                    self.send_note(
                        chat_id,
                        "Interval must be a whole number of minutes, at least 1. Try again.",
                    )
                    .await;
                    DialogState::AwaitingInterval
                }
            },
            DialogState::MainMenu | DialogState::Ended => {
                // Ordinary group chatter; replying to it would be noise.
                debug!("Unprompted text in chat {}, ignoring", chat_id);
                state
            }
        }
    }

    /// Render (or re-render) the menu for a chat, optionally prefixed with a
    /// confirmation note. Suppressed entirely when `hide_menu` is set.
    async fn render_menu(&self, chat_id: i64, note: Option<&str>) {
        let Some((topic_id, _)) = self.session_view(chat_id).await else {
            return;
        };
        let surface = {
            let sessions = self.sessions.lock().await;
            sessions.get(&chat_id).and_then(|s| s.menu_message)
        };

        let key = ChatKey::new(chat_id, topic_id);
        let settings = self.store.get_or_create(key).await;
        if settings.hide_menu {
            debug!("Menu hidden for chat {}, not rendering", chat_id);
            return;
        }

        let status = status_text(key, &settings);
        let text = match note {
            Some(note) => format!("{}\n\n{}", note, status),
            None => status,
        };

        match self
            .transport
            .render_menu(chat_id, surface, &text, MENU_BUTTONS)
            .await
        {
            Ok(message_id) => {
                let mut sessions = self.sessions.lock().await;
                if let Some(session) = sessions.get_mut(&chat_id) {
                    session.menu_message = Some(message_id);
                }
            }
            Err(e) => warn!("Failed to render menu for chat {}: {}", chat_id, e),
        }
    }

    async fn prompt(&self, chat_id: i64, next: DialogState, text: &str) -> DialogState {
        self.send_note(chat_id, text).await;
        self.set_state(chat_id, next).await;
        next
    }

    async fn send_note(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send(chat_id, None, text).await {
            warn!("Failed to message chat {}: {}", chat_id, e);
        }
    }

    async fn session_view(&self, chat_id: i64) -> Option<(Option<i64>, DialogState)> {
        let sessions = self.sessions.lock().await;
        sessions.get(&chat_id).map(|s| (s.topic_id, s.state))
    }

    async fn set_state(&self, chat_id: i64, state: DialogState) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&chat_id) {
            session.state = state;
        }
    }

    async fn end_session(&self, chat_id: i64) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&chat_id);
    }
}

/// Human-readable settings report, shared by the menu body and `/status`.
fn status_text(key: ChatKey, settings: &AnnouncementSettings) -> String {
    let topic = match key.topic_id {
        Some(id) => id.to_string(),
        None => "not set".to_string(),
    };
    let status = if settings.active { "active" } else { "stopped" };
    let last_sent = match settings.last_sent {
        Some(ts) => ts.to_rfc3339(),
        None => "never".to_string(),
    };
    format!(
        "Announcement settings\nTopic: {}\nMessage: {}\nInterval: every {} minute(s)\nStatus: {}\nLast sent: {}",
        topic, settings.text, settings.interval_minutes, status, last_sent
    )
}
