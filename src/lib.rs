//! Tannoy Library
//!
//! This library provides the core functionality of the Tannoy announcement bot.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Error types and taxonomy
pub mod errors;

/// Settings store and persistence module
pub mod store;

/// Recurring job scheduler module
pub mod scheduler;

/// Configuration dialog state machine
pub mod dialog;

/// Announcement delivery path
pub mod delivery;

/// Telegram transport module
pub mod bot;

/// Daemon lifecycle management module
pub mod daemon;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;
