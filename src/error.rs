//! Error types for Micept

use thiserror::Error;

use crate::types::EventTopic;

/// Result type alias for Micept operations
pub type Result<T> = std::result::Result<T, MiceptError>;

/// Main error type for Micept
#[derive(Error, Debug)]
pub enum MiceptError {
    #[error("Pull failed: {0}")]
    Pull(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Persist failed: {0}")]
    Persist(String),

    #[error("Subscription to {topic} failed: {reason}")]
    Subscription { topic: EventTopic, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse failure classes the engine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A round trip failed; the next natural cadence retries it
    TransientIo,
    /// A push channel could not be set up; polling still covers the state
    SubscriptionSetup,
    Config,
    Internal,
}

impl MiceptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MiceptError::Pull(_)
            | MiceptError::Action(_)
            | MiceptError::Persist(_)
            | MiceptError::Io(_) => ErrorKind::TransientIo,
            MiceptError::Subscription { .. } => ErrorKind::SubscriptionSetup,
            MiceptError::Config(_) | MiceptError::Serialization(_) => ErrorKind::Config,
            MiceptError::ChannelClosed(_) | MiceptError::InvalidInput(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }
}
