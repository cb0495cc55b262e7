//! Custom error types for flake.
//!
//! Test failures and user interruptions are run outcomes, not errors. The
//! types here cover the things that can go wrong around a run: signal
//! registration, terminal and pipe I/O, and the tool-protocol boundary.

use thiserror::Error;

/// Main error type for flake operations
#[derive(Error, Debug)]
pub enum FlakeError {
    /// Failed to subscribe to OS signals
    #[error("Failed to register {signal} handler: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Tool arguments could not be decoded
    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Peer violated the JSON-RPC protocol
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// A background task panicked or was aborted
    #[error("Task failed: {message}")]
    Task { message: String },

    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FlakeError {
    /// Create an invalid-arguments error
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a task error
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }

    /// Check if the error should terminate the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Signal { .. } | Self::Task { .. } | Self::Io(_))
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArguments { .. } | Self::Protocol { .. } => 2,
            _ => 1,
        }
    }
}

/// Type alias for flake results
pub type Result<T> = std::result::Result<T, FlakeError>;
