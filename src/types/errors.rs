//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by application callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by interaction, job and command callbacks.
pub type CallbackResult = std::result::Result<(), BoxError>;

/// Main error enum for the plugin host.
#[derive(Error, Debug)]
pub enum Error {
    /// Validation errors (bad names, malformed input).
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced token or job id does not exist (or has expired).
    #[error("not found: {0}")]
    NotFound(String),

    /// A scheduled job fired for a type nobody registered a callback for.
    #[error("no callback registered for type: {0}")]
    MissingCallback(String),

    /// An application callback failed. Never caught by the registries.
    #[error("callback for type '{intent_type}' failed: {source}")]
    Callback {
        intent_type: String,
        #[source]
        source: BoxError,
    },

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// Failures reported by the chat transport (reply, edit, registration).
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error is the typed "no such token / id" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn missing_callback(intent_type: impl Into<String>) -> Self {
        Self::MissingCallback(intent_type.into())
    }

    pub fn callback(intent_type: impl Into<String>, source: BoxError) -> Self {
        Self::Callback {
            intent_type: intent_type.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
