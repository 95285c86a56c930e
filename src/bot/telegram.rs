//! Telegram transport
//!
//! Speaks the Telegram Bot API directly over HTTPS: a long-polling
//! `getUpdates` loop for inbound events, `sendMessage` /
//! `editMessageText` for outbound traffic, and inline keyboards for the
//! configuration menu. Announcements address forum topics via
//! `message_thread_id`.
//!
//! Inbound updates are classified into command, free-text, and
//! button-selection events and dispatched to the dialog engine. Messages from
//! users outside the allow-list are ignored (an empty allow-list allows
//! everyone).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::bot::{MenuButton, ReplyAnchor, Transport};
use crate::dialog::DialogEngine;
use crate::errors::TannoyError;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Inline keyboard button for Telegram
#[derive(Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

/// Inline keyboard markup for Telegram
#[derive(Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Deserialize, Debug)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize, Debug)]
struct Message {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
    from: Option<User>,
    message_thread_id: Option<i64>,
    #[serde(default)]
    is_topic_message: bool,
    reply_to_message: Option<Box<Message>>,
}

#[derive(Deserialize, Debug)]
struct Chat {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct User {
    id: i64,
}

#[derive(Deserialize, Debug)]
struct CallbackQuery {
    id: String,
    from: User,
    data: Option<String>,
    message: Option<Message>,
}

/// Generic Bot API envelope
#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SentMessage {
    message_id: i64,
}

#[derive(Deserialize, Debug)]
struct BotProfile {
    username: Option<String>,
}

pub struct TelegramTransport {
    token: String,
    api_base: String,
    client: Client,
    allowed_users: Vec<i64>,
    poll_timeout_secs: u64,
    /// Our own username, resolved via getMe when polling starts. Commands
    /// carrying an @suffix for a different bot are ignored.
    bot_username: tokio::sync::OnceCell<String>,
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl TelegramTransport {
    pub fn new(token: String, allowed_users: Vec<i64>, poll_timeout_secs: u64) -> Self {
        Self {
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(poll_timeout_secs + 30))
                .build()
                .unwrap_or_default(),
            allowed_users,
            poll_timeout_secs,
            bot_username: tokio::sync::OnceCell::new(),
        }
    }

    /// Point the client at a different API host. Used by tests.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Start the long-polling loop.
    ///
    /// This blocks the current task. Should be spawned in a background
    /// tokio task; it runs until the task is aborted.
    pub async fn run_polling(&self, dialog: Arc<DialogEngine>) {
        info!("Starting Telegram long-polling loop...");
        self.resolve_own_username().await;
        let mut offset = 0;

        loop {
            match self.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = update.update_id + 1;
                        self.handle_update(update, &dialog).await;
                    }
                }
                Err(e) => {
                    error!("Failed to fetch Telegram updates: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Look up our own username via getMe. A failure is logged and tolerated:
    /// commands without an @suffix keep working either way.
    async fn resolve_own_username(&self) {
        if self.bot_username.get().is_some() {
            return;
        }
        match self.get_me().await {
            Ok(Some(username)) => {
                info!("Polling as @{}", username);
                self.bot_username.set(username).ok();
            }
            Ok(None) => warn!("getMe returned a profile without a username"),
            Err(e) => warn!("Failed to resolve own username via getMe: {}", e),
        }
    }

    async fn get_me(&self) -> Result<Option<String>, TannoyError> {
        let response = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| TannoyError::Transport(format!("getMe request failed: {}", e)))?
            .json::<ApiResponse<BotProfile>>()
            .await
            .map_err(|e| TannoyError::Transport(format!("getMe decode failed: {}", e)))?;

        if !response.ok {
            return Err(TannoyError::Transport(format!(
                "getMe returned ok=false: {}",
                response.description.unwrap_or_default()
            )));
        }

        Ok(response.result.and_then(|p| p.username))
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TannoyError> {
        let url = format!(
            "{}?offset={}&timeout={}",
            self.method_url("getUpdates"),
            offset,
            self.poll_timeout_secs
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TannoyError::Transport(format!("getUpdates request failed: {}", e)))?
            .json::<ApiResponse<Vec<Update>>>()
            .await
            .map_err(|e| TannoyError::Transport(format!("getUpdates decode failed: {}", e)))?;

        if !response.ok {
            return Err(TannoyError::Transport(format!(
                "getUpdates returned ok=false: {}",
                response.description.unwrap_or_default()
            )));
        }

        Ok(response.result.unwrap_or_default())
    }

    fn user_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }

    async fn handle_update(&self, update: Update, dialog: &Arc<DialogEngine>) {
        if let Some(query) = update.callback_query {
            self.handle_callback(query, dialog).await;
            return;
        }
        if let Some(msg) = update.message {
            self.handle_message(msg, dialog).await;
        }
    }

    async fn handle_callback(&self, query: CallbackQuery, dialog: &Arc<DialogEngine>) {
        // Dismiss the client-side spinner regardless of the outcome.
        self.answer_callback_query(&query.id).await;

        if !self.user_allowed(query.from.id) {
            warn!("Ignoring button press from unauthorized user {}", query.from.id);
            return;
        }

        let Some(chat_id) = query.message.as_ref().map(|m| m.chat.id) else {
            debug!("Callback query without originating message, ignoring");
            return;
        };
        let Some(choice) = query.data else {
            debug!("Callback query without data, ignoring");
            return;
        };

        let next = dialog.on_button(chat_id, &choice).await;
        debug!("Button {:?} in chat {} -> {:?}", choice, chat_id, next);
    }

    async fn handle_message(&self, msg: Message, dialog: &Arc<DialogEngine>) {
        let chat_id = msg.chat.id;

        let user_id = match msg.from.as_ref() {
            Some(u) => u.id,
            None => {
                debug!("Message with no user info - ignoring");
                return;
            }
        };
        if !self.user_allowed(user_id) {
            warn!("Ignoring message from unauthorized user {}", user_id);
            return;
        }

        let Some(text) = msg.text.as_deref() else {
            return;
        };

        // Commands operate on the (chat, topic) pair derived from where the
        // command was issued. message_thread_id is only a forum topic when
        // is_topic_message is set; it is also populated for plain replies.
        let context_topic = if msg.is_topic_message {
            msg.message_thread_id
        } else {
            None
        };

        if text.starts_with('/') {
            let own_username = self.bot_username.get().map(String::as_str);
            let Some(command) = parse_command(text, own_username) else {
                debug!("Ignoring command addressed to another bot in chat {}", chat_id);
                return;
            };
            info!("Received /{} from {} in chat {}", command, user_id, chat_id);
            match command {
                "start" => {
                    dialog.on_command_start(chat_id, context_topic).await;
                }
                "status" => {
                    let report = dialog.on_command_status(chat_id, context_topic).await;
                    if let Err(e) = self.send(chat_id, context_topic, &report).await {
                        error!("Failed to send status report to {}: {}", chat_id, e);
                    }
                }
                other => {
                    let reply = format!(
                        "Unknown command: /{}\n/start - open the announcement menu\n/status - show current settings",
                        other
                    );
                    if let Err(e) = self.send(chat_id, context_topic, &reply).await {
                        error!("Failed to send command reply to {}: {}", chat_id, e);
                    }
                }
            }
            return;
        }

        let anchor = msg.reply_to_message.as_deref().map(|replied| ReplyAnchor {
            message_id: replied.message_id,
            thread_id: if replied.is_topic_message {
                replied.message_thread_id
            } else {
                None
            },
        });

        let next = dialog.on_text(chat_id, text, anchor).await;
        debug!("Text in chat {} -> {:?}", chat_id, next);
    }

    async fn answer_callback_query(&self, callback_id: &str) {
        let body = serde_json::json!({ "callback_query_id": callback_id });
        let result = self
            .client
            .post(self.method_url("answerCallbackQuery"))
            .json(&body)
            .send()
            .await;
        if let Err(e) = result {
            debug!("answerCallbackQuery failed: {}", e);
        }
    }

    async fn call_send_message(
        &self,
        chat_id: i64,
        topic_id: Option<i64>,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, TannoyError> {
        #[derive(Serialize)]
        struct SendMsgReq<'a> {
            chat_id: i64,
            text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            message_thread_id: Option<i64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply_markup: Option<&'a InlineKeyboardMarkup>,
        }

        let req = SendMsgReq {
            chat_id,
            text,
            message_thread_id: topic_id,
            reply_markup: markup,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&req)
            .send()
            .await
            .map_err(|e| TannoyError::Transport(format!("sendMessage request failed: {}", e)))?
            .json::<ApiResponse<SentMessage>>()
            .await
            .map_err(|e| TannoyError::Transport(format!("sendMessage decode failed: {}", e)))?;

        if !response.ok {
            return Err(TannoyError::Transport(format!(
                "sendMessage rejected: {}",
                response.description.unwrap_or_default()
            )));
        }

        response
            .result
            .map(|m| m.message_id)
            .ok_or_else(|| TannoyError::Transport("sendMessage returned no message".into()))
    }

    async fn call_edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: &InlineKeyboardMarkup,
    ) -> Result<(), TannoyError> {
        #[derive(Serialize)]
        struct EditMsgReq<'a> {
            chat_id: i64,
            message_id: i64,
            text: &'a str,
            reply_markup: &'a InlineKeyboardMarkup,
        }

        let req = EditMsgReq {
            chat_id,
            message_id,
            text,
            reply_markup: markup,
        };

        let response = self
            .client
            .post(self.method_url("editMessageText"))
            .json(&req)
            .send()
            .await
            .map_err(|e| TannoyError::Transport(format!("editMessageText request failed: {}", e)))?
            .json::<ApiResponse<serde_json::Value>>()
            .await
            .map_err(|e| TannoyError::Transport(format!("editMessageText decode failed: {}", e)))?;

        if !response.ok {
            return Err(TannoyError::Transport(format!(
                "editMessageText rejected: {}",
                response.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

/// Extract the command name from `/command` or `/command@botname` syntax.
///
/// In multi-bot groups an @suffix addresses one specific bot; a command
/// explicitly addressed to another bot is not a command for us. With no
/// resolved own username, suffixed commands are accepted as before.
fn parse_command<'a>(text: &'a str, own_username: Option<&str>) -> Option<&'a str> {
    let first = text.split_whitespace().next()?;
    let rest = first.strip_prefix('/')?;

    let (name, suffix) = match rest.split_once('@') {
        Some((name, suffix)) => (name, Some(suffix)),
        None => (rest, None),
    };
    if name.is_empty() {
        return None;
    }
    if let (Some(suffix), Some(own)) = (suffix, own_username) {
        if !suffix.eq_ignore_ascii_case(own) {
            return None;
        }
    }
    Some(name)
}

fn build_markup(buttons: &[MenuButton]) -> InlineKeyboardMarkup {
    // One button per row keeps labels readable on narrow clients.
    InlineKeyboardMarkup {
        inline_keyboard: buttons
            .iter()
            .map(|b| {
                vec![InlineKeyboardButton {
                    text: b.label.to_string(),
                    callback_data: b.choice.to_string(),
                }]
            })
            .collect(),
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        chat_id: i64,
        topic_id: Option<i64>,
        text: &str,
    ) -> Result<(), TannoyError> {
        self.call_send_message(chat_id, topic_id, text, None)
            .await
            .map(|_| ())
    }

    async fn render_menu(
        &self,
        chat_id: i64,
        surface: Option<i64>,
        text: &str,
        buttons: &[MenuButton],
    ) -> Result<i64, TannoyError> {
        let markup = build_markup(buttons);

        if let Some(message_id) = surface {
            match self.call_edit_message(chat_id, message_id, text, &markup).await {
                Ok(()) => return Ok(message_id),
                Err(e) => {
                    // The old surface may have been deleted or is too old to
                    // edit; fall back to a fresh message.
                    debug!("Menu edit failed for chat {}, sending fresh: {}", chat_id, e);
                }
            }
        }

        self.call_send_message(chat_id, None, text, Some(&markup))
            .await
    }
}
