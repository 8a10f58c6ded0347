//! Delegation error types.

use std::io;

use thiserror::Error;

/// Errors raised while decoding a stream-json byte stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A single line grew past the configured cap without a newline.
    #[error("stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Result type for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors that can occur while running the CLI agent.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The agent executable could not be started.
    #[error("failed to spawn {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },

    /// Reading the agent's output or waiting for it failed.
    #[error("I/O error while running agent: {0}")]
    Io(#[from] io::Error),

    /// The agent produced more output than allowed.
    #[error("agent output exceeded {limit} bytes")]
    OutputLimit { limit: usize },

    /// Working directory is missing or not a directory.
    #[error("working directory does not exist: {0}")]
    InvalidCwd(String),
}

impl From<DecodeError> for ExecutorError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::LineTooLong { limit } => ExecutorError::OutputLimit { limit },
        }
    }
}
