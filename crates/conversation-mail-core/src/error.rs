//! Error types for Conversation Mail
//!
//! Lookup misses are explicit variants instead of silent `None`s. A revoked
//! notification is *not* an error: it is reported through the access decision
//! of the notification event.

use thiserror::Error;

/// Result type alias for Conversation Mail operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Conversation Mail
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Resource Not Found Errors
    // ==========================================================================
    #[error("Conversation not found: {0}")]
    ConversationNotFound(i64),

    #[error("Message not found: {0}")]
    MessageNotFound(i64),

    // ==========================================================================
    // Validation Errors
    // ==========================================================================
    #[error("Conversation mismatch: message belongs to {expected}, got {actual}")]
    ConversationMismatch { expected: i64, actual: i64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ==========================================================================
    // Rendering Errors
    // ==========================================================================
    #[error("Template error: {0}")]
    Template(String),

    // ==========================================================================
    // Storage / I/O Errors
    // ==========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the error type string (for JSON responses and log fields)
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::ConversationNotFound(_) | Self::MessageNotFound(_) => "NOT_FOUND",
            Self::ConversationMismatch { .. } | Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Template(_) => "TEMPLATE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Io(_) => "OS_ERROR",
        }
    }

    /// Returns whether the error is recoverable (can be retried or corrected by the caller)
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound(_)
                | Self::MessageNotFound(_)
                | Self::ConversationMismatch { .. }
                | Self::InvalidArgument(_)
                | Self::Storage(_)
        )
    }
}
