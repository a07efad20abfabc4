//! Ava Core Library
//!
//! Emotional state, persistent memory, personality development, reflection,
//! memory consolidation and the conversation pipeline, wired together by the
//! [`Orchestrator`].

pub mod awareness;
pub mod backup;
pub mod config;
pub mod consolidation;
pub mod conversation;
pub mod emotion;
pub mod error;
pub mod fakes;
pub mod llm;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod obs;
pub mod orchestrator;
pub mod personality;
pub mod storage;
pub mod telemetry;
pub mod time;

/// Crate version, reported by `ava --version` and the admin API.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::{AvaError, Result};

pub use config::{ConfigError, ConfigResult, Settings};

pub use models::{EmotionalContext, ErrorRecord, Memory, MemoryType, Severity, Timestamps};

pub use emotion::{EmotionAnalyzer, EmotionalEngine, EmotionalState, EmotionalSystem};

pub use memory::{
    FileMemoryStore, MemoryError, MemoryManager, MemoryPatch, MemoryQuery, MemoryStats,
    RetentionPolicy,
};

pub use backup::{BackupError, BackupManager, BackupManifest};

pub use awareness::{SelfAwareness, SelfAwarenessSystem};
pub use consolidation::{ConsolidationSystem, MemoryConsolidation};
pub use personality::{
    DevelopmentStage, PersonalityEngine, PersonalitySummary, PersonalitySystem, PersonalityTraits,
};

pub use conversation::{ConversationContext, ConversationHandler, Exchange, FALLBACK_REPLY};
pub use llm::{client_from_config, LlmClient, LlmError, Message, Role};

pub use orchestrator::{HealthReport, HealthStatus, Orchestrator, Subsystems, SystemStatus};
