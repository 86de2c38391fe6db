//! Error types for Pulsekeeper.

use thiserror::Error;

use crate::heart::HookKind;

/// Main error type for Pulsekeeper operations.
#[derive(Error, Debug)]
pub enum PulseError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// `start` was called on a heart that is still ticking
    #[error("Heart is already running")]
    AlreadyRunning,

    /// A lifecycle hook failed, panicked or timed out
    #[error("Hook {hook} failed: {reason}")]
    Hook { hook: HookKind, reason: String },

    /// `start` was called outside a Tokio runtime
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A beat observer rejected a beat
    #[error("Observer error: {0}")]
    Observer(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Pulsekeeper operations.
pub type Result<T> = std::result::Result<T, PulseError>;
