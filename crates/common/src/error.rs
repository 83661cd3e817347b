use thiserror::Error;

use crate::ids::EdgeId;

/// Top-level error type for relationship operations.
#[derive(Debug, Error)]
pub enum TetherError {
    // --- Domain errors (stable, caller-visible) ---
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate relationship-track edge, or a lost insert race.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The edge reached its authoritative state but a follow-up effect failed.
    /// The edge is never rolled back; counters are reconciled by the repair pass.
    #[error("Partial success on edge {edge_id}: {detail}")]
    PartialSuccess { edge_id: EdgeId, detail: String },

    // --- Internal errors (normalized before leaving the process) ---
    #[error("Store error: {0}")]
    Store(String),

    #[error("Identity service error: {0}")]
    Identity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// Outward classification of an error. Transport adapters map on this, never on
/// the message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    Forbidden,
    PartialSuccess,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::PartialSuccess => "partial_success",
            Self::Internal => "internal",
        }
    }
}

impl TetherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::PartialSuccess { .. } => ErrorKind::PartialSuccess,
            Self::Store(_)
            | Self::Identity(_)
            | Self::Config(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only a lost conditional-insert race is worth retrying: the caller
    /// re-resolves the current state and decides whether to no-op.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Message safe to show outside the process. Internal failures carry no
    /// backend detail.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type alias for relationship operations.
pub type Result<T> = std::result::Result<T, TetherError>;
