//! Top-level error taxonomy for Ava.

use crate::backup::BackupError;
use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::memory::MemoryError;

/// Ava domain errors.
#[derive(Debug, thiserror::Error)]
pub enum AvaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("subsystem {subsystem} failed to initialize: {reason}")]
    Initialization { subsystem: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Ava domain operations.
pub type Result<T> = std::result::Result<T, AvaError>;
