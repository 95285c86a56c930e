//! Error types and handling
//!
//! This module provides the error types used throughout Tannoy. Errors are
//! grouped by the subsystem that raised them; most of them are recovered
//! locally (the dialog re-prompts, delivery skips a tick, persistence keeps
//! the in-memory state authoritative) and never terminate the process.

use thiserror::Error;

/// Main error type
///
/// Each variant carries a human-readable description. Variants map to the
/// subsystems that can fail:
///
/// - **Validation**: bad user input in the dialog (re-prompted, never fatal)
/// - **Transport**: Telegram send/edit/poll failures
/// - **Persistence**: snapshot read/write failures
/// - **Scheduler**: job bookkeeping problems
/// - **Config**: invalid or missing configuration
#[derive(Debug, Error)]
pub enum TannoyError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TannoyError {
    /// Whether the error can be recovered from without operator intervention.
    ///
    /// Everything except configuration errors is recoverable: transport and
    /// persistence failures degrade gracefully, validation errors re-prompt.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TannoyError::Config(_))
    }
}
