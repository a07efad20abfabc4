//! Slow development of Ava's Big Five personality traits from conversation.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::memory::{MemoryManager, MemoryQuery};
use crate::models::{clamp_unit, Memory, MemoryType};
use crate::storage;
use crate::time::{is_due, lenient_option, now};

/// Largest change of a single trait per update.
pub const MAX_NUDGE: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityTraits {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl Default for PersonalityTraits {
    fn default() -> Self {
        Self {
            openness: 0.5,
            conscientiousness: 0.5,
            extraversion: 0.5,
            agreeableness: 0.5,
            neuroticism: 0.5,
        }
    }
}

impl PersonalityTraits {
    /// `(name, value)` pairs in a fixed order.
    pub fn iter(&self) -> [(&'static str, f64); 5] {
        [
            ("openness", self.openness),
            ("conscientiousness", self.conscientiousness),
            ("extraversion", self.extraversion),
            ("agreeableness", self.agreeableness),
            ("neuroticism", self.neuroticism),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevelopmentStage {
    Nascent,
    Developing,
    Maturing,
    Mature,
}

impl DevelopmentStage {
    pub fn from_interactions(interactions: u64) -> Self {
        match interactions {
            0..=9 => Self::Nascent,
            10..=99 => Self::Developing,
            100..=999 => Self::Maturing,
            _ => Self::Mature,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nascent => "nascent",
            Self::Developing => "developing",
            Self::Maturing => "maturing",
            Self::Mature => "mature",
        }
    }
}

impl fmt::Display for DevelopmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted as `personality.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityState {
    #[serde(default)]
    pub traits: PersonalityTraits,
    #[serde(default)]
    pub interactions: u64,
    #[serde(with = "lenient_option", default)]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalitySummary {
    pub traits: PersonalityTraits,
    pub development_stage: DevelopmentStage,
    pub interactions: u64,
    #[serde(with = "lenient_option", default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl PersonalityState {
    pub fn summary(&self) -> PersonalitySummary {
        PersonalitySummary {
            traits: self.traits,
            development_stage: DevelopmentStage::from_interactions(self.interactions),
            interactions: self.interactions,
            last_update: self.last_update,
        }
    }

    /// Fold new conversation memories into the traits.
    pub fn absorb(&mut self, conversations: &[Memory]) {
        let valences: Vec<f64> = conversations
            .iter()
            .filter_map(|m| m.emotional_context.as_ref().map(|c| c.valence))
            .collect();
        if !valences.is_empty() {
            let mean = valences.iter().sum::<f64>() / valences.len() as f64;
            let step = (mean.abs() * MAX_NUDGE).min(MAX_NUDGE);
            let t = &mut self.traits;
            if mean > 0.0 {
                t.agreeableness = clamp_unit(t.agreeableness + step);
                t.extraversion = clamp_unit(t.extraversion + step * 0.5);
            } else if mean < 0.0 {
                t.neuroticism = clamp_unit(t.neuroticism + step);
            }
        }

        let themes: HashSet<String> = conversations
            .iter()
            .flat_map(|m| m.themes.iter().map(|t| t.to_lowercase()))
            .collect();
        if themes.len() >= 3 {
            let step = MAX_NUDGE * (themes.len() as f64 / 10.0).min(1.0);
            self.traits.openness = clamp_unit(self.traits.openness + step);
        }

        // Regular conversation counts towards conscientiousness.
        if !conversations.is_empty() {
            let step = MAX_NUDGE * 0.5 * (conversations.len() as f64 / 20.0).min(1.0);
            self.traits.conscientiousness = clamp_unit(self.traits.conscientiousness + step);
        }

        self.interactions += conversations.len() as u64;
    }
}

/// Personality subsystem driven by the orchestrator.
#[async_trait]
pub trait PersonalityEngine: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    /// Returns false when skipped because the update interval has not elapsed.
    async fn update_personality(&self, force: bool) -> Result<bool>;

    async fn get_personality_summary(&self) -> Result<PersonalitySummary>;
}

pub struct PersonalitySystem {
    memory: Arc<dyn MemoryManager>,
    interval: chrono::Duration,
    state_path: Option<PathBuf>,
    state: RwLock<PersonalityState>,
}

impl PersonalitySystem {
    pub fn new(memory: Arc<dyn MemoryManager>, interval: chrono::Duration) -> Self {
        Self {
            memory,
            interval,
            state_path: None,
            state: RwLock::new(PersonalityState::default()),
        }
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub async fn state(&self) -> PersonalityState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl PersonalityEngine for PersonalitySystem {
    async fn initialize(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        match storage::read_json_opt::<PersonalityState>(path) {
            Ok(Some(loaded)) => *self.state.write().await = loaded,
            Ok(None) => {}
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring corrupt personality state"
                );
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn update_personality(&self, force: bool) -> Result<bool> {
        let at = now();
        let mut state = self.state.write().await;
        if !force && !is_due(state.last_update, self.interval, at) {
            return Ok(false);
        }

        let mut query = MemoryQuery::all().with_type(MemoryType::Conversation);
        if let Some(since) = state.last_update {
            query = query.since(since);
        }
        let conversations = self.memory.get_memories(&query).await?;

        state.absorb(&conversations);
        state.last_update = Some(at);
        if let Some(path) = &self.state_path {
            storage::write_json_atomic(path, &*state)?;
        }
        tracing::debug!(
            new_conversations = conversations.len(),
            interactions = state.interactions,
            stage = %DevelopmentStage::from_interactions(state.interactions),
            "personality updated"
        );
        Ok(true)
    }

    async fn get_personality_summary(&self) -> Result<PersonalitySummary> {
        Ok(self.state.read().await.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmotionalContext;

    fn conversation(valence: f64, theme: &str) -> Memory {
        Memory::new(MemoryType::Conversation, "chat")
            .with_themes([theme])
            .with_emotional_context(EmotionalContext::new("x", 0.5, valence, 0.5))
    }

    #[test]
    fn test_stage_thresholds() {
        use DevelopmentStage::*;
        let cases = [
            (0, Nascent),
            (9, Nascent),
            (10, Developing),
            (100, Maturing),
            (1000, Mature),
        ];
        for (interactions, stage) in cases {
            assert_eq!(DevelopmentStage::from_interactions(interactions), stage);
        }
    }

    #[test]
    fn test_positive_conversations_raise_agreeableness() {
        let mut state = PersonalityState::default();
        state.absorb(&[conversation(0.8, "a"), conversation(0.6, "b")]);
        assert!(state.traits.agreeableness > 0.5);
        assert!(state.traits.agreeableness <= 0.5 + MAX_NUDGE);
        assert_eq!(state.traits.neuroticism, 0.5);
        assert_eq!(state.interactions, 2);
    }

    #[test]
    fn test_negative_conversations_raise_neuroticism() {
        let mut state = PersonalityState::default();
        state.absorb(&[conversation(-1.0, "a")]);
        assert!((state.traits.neuroticism - 0.52).abs() < 1e-9);
    }

    #[test]
    fn test_varied_themes_raise_openness() {
        let mut state = PersonalityState::default();
        let many: Vec<_> = ["art", "music", "space", "food"]
            .iter()
            .map(|t| conversation(0.0, t))
            .collect();
        state.absorb(&many);
        assert!(state.traits.openness > 0.5);
    }

    #[test]
    fn test_traits_stay_clamped() {
        let mut state = PersonalityState::default();
        state.traits.agreeableness = 0.995;
        state.absorb(&[conversation(1.0, "a")]);
        assert_eq!(state.traits.agreeableness, 1.0);
    }

    #[test]
    fn test_summary_serializes_stage() {
        let value = serde_json::to_value(PersonalityState::default().summary()).unwrap();
        assert_eq!(value["development_stage"], "nascent");
        assert_eq!(value["traits"]["openness"], 0.5);
    }
}
