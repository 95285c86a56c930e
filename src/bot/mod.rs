//! Chat transport abstraction
//!
//! The dialog engine and the delivery path talk to the messaging platform
//! through the [`Transport`] trait; [`telegram::TelegramTransport`] is the
//! production implementation. Tests swap in a recording mock.

use async_trait::async_trait;

use crate::errors::TannoyError;

pub mod telegram;

pub use telegram::TelegramTransport;

/// One inline menu button: a label shown to the user and the choice token
/// reported back when it is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: &'static str,
    pub choice: &'static str,
}

impl MenuButton {
    pub const fn new(label: &'static str, choice: &'static str) -> Self {
        Self { label, choice }
    }
}

/// Metadata of the message a free-text input replied to. Used by the dialog
/// to derive the target topic: replying to any message inside a forum topic
/// anchors that topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyAnchor {
    /// Id of the replied-to message
    pub message_id: i64,
    /// Forum topic the replied-to message lives in, if any
    pub thread_id: Option<i64>,
}

/// Outbound messaging surface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send plain text to a chat, optionally addressed into a forum topic.
    async fn send(
        &self,
        chat_id: i64,
        topic_id: Option<i64>,
        text: &str,
    ) -> Result<(), TannoyError>;

    /// Render a menu with inline buttons. When `surface` names a previously
    /// rendered menu message, edit it in place; fall back to sending fresh if
    /// the edit fails. Returns the handle of the message now showing the menu.
    async fn render_menu(
        &self,
        chat_id: i64,
        surface: Option<i64>,
        text: &str,
        buttons: &[MenuButton],
    ) -> Result<i64, TannoyError>;
}
