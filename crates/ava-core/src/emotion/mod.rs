//! Emotion analysis of incoming text and Ava's own emotional state.

pub mod analyzer;
pub mod lexicon;
pub mod state;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::EmotionalContext;

pub use analyzer::EmotionAnalyzer;
pub use lexicon::Emotion;
pub use state::{EmotionalState, EmotionalSystem};

/// Emotional subsystem driven by the orchestrator.
#[async_trait]
pub trait EmotionalEngine: Send + Sync {
    /// Load persisted state, if any.
    async fn initialize(&self) -> Result<()>;

    /// Read the emotion expressed in `text`.
    async fn analyze_text(&self, text: &str) -> Result<EmotionalContext>;

    /// Fold a reading into Ava's own state.
    async fn update_emotional_state(&self, reading: &EmotionalContext) -> Result<()>;

    /// Ava's state right now, decay applied.
    async fn get_current_state(&self) -> Result<EmotionalContext>;
}
