//! Ava's own emotional state: blending, decay and persistence.

use std::collections::VecDeque;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::analyzer::EmotionAnalyzer;
use super::EmotionalEngine;
use crate::config::{ConfigResult, EmotionalConfig};
use crate::error::Result;
use crate::models::{clamp_unit, EmotionalContext};
use crate::storage;
use crate::time::{lenient, now};

/// Values the state relaxes towards while nothing happens.
pub const BASELINE_INTENSITY: f64 = 0.3;
pub const BASELINE_AROUSAL: f64 = 0.5;
pub const BASELINE_VALENCE: f64 = 0.0;

/// Maximum number of past states kept.
pub const HISTORY_LIMIT: usize = 50;

/// Share of a fully confident reading that moves the state.
const BLEND: f64 = 0.6;

/// Once the intensity decay factor drops below this, the primary emotion is
/// reported as neutral.
const NEUTRAL_FACTOR: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub current: EmotionalContext,
    #[serde(default)]
    pub history: VecDeque<EmotionalContext>,
    #[serde(with = "lenient", default = "now")]
    pub last_update: DateTime<Utc>,
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self {
            current: EmotionalContext::neutral(),
            history: VecDeque::new(),
            last_update: now(),
        }
    }
}

impl EmotionalState {
    /// State as it looks at `at`, after time decay.
    pub fn decayed(&self, config: &EmotionalConfig, at: DateTime<Utc>) -> EmotionalContext {
        let hours = (at - self.last_update).num_milliseconds().max(0) as f64 / 3_600_000.0;
        let rates = &config.decay_rates;
        let factor = |rate: f64| (1.0 - rate).powf(hours);

        let intensity_factor = factor(rates.intensity);
        let mut ctx = self.current.clone();
        ctx.intensity =
            BASELINE_INTENSITY + (ctx.intensity - BASELINE_INTENSITY) * intensity_factor;
        ctx.valence = BASELINE_VALENCE + (ctx.valence - BASELINE_VALENCE) * factor(rates.valence);
        ctx.arousal = BASELINE_AROUSAL + (ctx.arousal - BASELINE_AROUSAL) * factor(rates.arousal);
        if intensity_factor < NEUTRAL_FACTOR {
            ctx.primary = "neutral".to_string();
        }
        ctx.timestamp = at;
        ctx
    }

    /// Blend a new reading into the state at `at`.
    pub fn blend(
        &mut self,
        config: &EmotionalConfig,
        reading: &EmotionalContext,
        at: DateTime<Utc>,
    ) {
        let mut next = self.decayed(config, at);
        let weight = BLEND * reading.confidence;

        if reading.is_confident(config.confidence_threshold) {
            if !reading.is_neutral() {
                next.primary = reading.primary.clone();
            }
            next.intensity = lerp(next.intensity, reading.intensity, weight);
            next.valence = lerp(next.valence, reading.valence, weight).clamp(-1.0, 1.0);
            next.arousal = lerp(next.arousal, reading.arousal, weight);
            next.confidence = reading.confidence;
        } else {
            // Unsure readings still stir Ava up a little.
            next.arousal = lerp(next.arousal, reading.arousal, weight * 0.5);
        }
        next.intensity = clamp_unit(next.intensity);
        next.arousal = clamp_unit(next.arousal);

        let previous = std::mem::replace(&mut self.current, next);
        self.history.push_back(previous);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.last_update = at;
    }
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

/// File-persisted [`EmotionalEngine`].
pub struct EmotionalSystem {
    config: EmotionalConfig,
    analyzer: EmotionAnalyzer,
    state_path: Option<PathBuf>,
    state: RwLock<EmotionalState>,
}

impl EmotionalSystem {
    /// In-memory system; nothing is persisted.
    pub fn new(config: EmotionalConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: EmotionAnalyzer::new(config.sentiment_model.clone()),
            config,
            state_path: None,
            state: RwLock::new(EmotionalState::default()),
        })
    }

    /// Persist the state to `path` on every update.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Start from an explicit state.
    pub fn with_state(mut self, state: EmotionalState) -> Self {
        self.state = RwLock::new(state);
        self
    }

    pub fn config(&self) -> &EmotionalConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> EmotionalState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl EmotionalEngine for EmotionalSystem {
    async fn initialize(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        match storage::read_json_opt::<EmotionalState>(path) {
            Ok(Some(loaded)) => {
                tracing::debug!(primary = %loaded.current.primary, "emotional state restored");
                *self.state.write().await = loaded;
            }
            Ok(None) => {}
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring corrupt emotional state"
                );
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn analyze_text(&self, text: &str) -> Result<EmotionalContext> {
        self.analyzer.analyze(text)
    }

    async fn update_emotional_state(&self, reading: &EmotionalContext) -> Result<()> {
        let mut state = self.state.write().await;
        state.blend(&self.config, reading, now());
        if let Some(path) = &self.state_path {
            storage::write_json_atomic(path, &*state)?;
        }
        Ok(())
    }

    async fn get_current_state(&self) -> Result<EmotionalContext> {
        Ok(self.state.read().await.decayed(&self.config, now()))
    }
}
