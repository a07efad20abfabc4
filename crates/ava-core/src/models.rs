//! Shared record types: timestamps, emotional context, memories and error
//! records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::{lenient, lenient_option, now};

/// Creation and modification times carried by every persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    #[serde(with = "lenient", default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "lenient_option", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Timestamps {
    fn default() -> Self {
        Self {
            created_at: now(),
            updated_at: None,
        }
    }
}

impl Timestamps {
    pub fn at(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            updated_at: None,
        }
    }

    /// Mark the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Some(now());
    }
}

// ---------------------------------------------------------------------------
// EmotionalContext
// ---------------------------------------------------------------------------

/// Emotional reading of a piece of text or of Ava's own state.
///
/// `intensity`, `arousal` and `confidence` live in `[0, 1]`, `valence` in
/// `[-1, 1]`; constructors clamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalContext {
    pub primary: String,
    #[serde(default)]
    pub intensity: f64,
    #[serde(default)]
    pub valence: f64,
    #[serde(default)]
    pub arousal: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(with = "lenient", default = "now")]
    pub timestamp: DateTime<Utc>,
}

impl EmotionalContext {
    pub fn new(primary: impl Into<String>, intensity: f64, valence: f64, arousal: f64) -> Self {
        Self {
            primary: primary.into(),
            intensity: clamp_unit(intensity),
            valence: valence.clamp(-1.0, 1.0),
            arousal: clamp_unit(arousal),
            confidence: 1.0,
            metadata: Map::new(),
            timestamp: now(),
        }
    }

    /// Resting state: no dominant emotion.
    pub fn neutral() -> Self {
        Self::new("neutral", 0.3, 0.0, 0.5).with_confidence(0.5)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    pub fn is_neutral(&self) -> bool {
        self.primary == "neutral"
    }
}

impl Default for EmotionalContext {
    fn default() -> Self {
        Self::neutral()
    }
}

pub(crate) fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Category of a memory; also the name of its storage sub-directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Core,
    Personal,
    Conversation,
    Reflection,
    Consolidated,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Core,
        MemoryType::Personal,
        MemoryType::Conversation,
        MemoryType::Reflection,
        MemoryType::Consolidated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Personal => "personal",
            Self::Conversation => "conversation",
            Self::Reflection => "reflection",
            Self::Consolidated => "consolidated",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown memory type: {s}"))
    }
}

/// A single persisted memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub memory_type: MemoryType,
    pub content: String,
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_context: Option<EmotionalContext>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(with = "lenient_option", default)]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

fn default_importance() -> f64 {
    0.5
}

impl Memory {
    pub fn new(memory_type: MemoryType, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            memory_type,
            content: content.into(),
            importance: default_importance(),
            themes: Vec::new(),
            emotional_context: None,
            access_count: 0,
            last_accessed: None,
            metadata: Map::new(),
            timestamps: Timestamps::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_unit(importance);
        self
    }

    pub fn with_themes<I, S>(mut self, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.themes = themes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_emotional_context(mut self, ctx: EmotionalContext) -> Self {
        self.emotional_context = Some(ctx);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.timestamps.created_at
    }

    /// Count one read of this memory.
    pub fn record_access(&mut self) {
        self.access_count += 1;
        self.last_accessed = Some(now());
    }

    pub fn has_theme(&self, theme: &str) -> bool {
        self.themes.iter().any(|t| t.eq_ignore_ascii_case(theme))
    }
}

// ---------------------------------------------------------------------------
// Error log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// An operational error kept for operators in the memory error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub source: String,
    pub severity: Severity,
    #[serde(with = "lenient", default = "now")]
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(source: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
            severity,
            timestamp: now(),
        }
    }
}
