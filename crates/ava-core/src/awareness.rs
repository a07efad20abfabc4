//! Periodic self-reflection over recent memories.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::memory::{MemoryManager, MemoryQuery};
use crate::metrics::METRICS;
use crate::models::{Memory, MemoryType};
use crate::obs;
use crate::time::{is_due, now};

pub const REFLECTION_IMPORTANCE: f64 = 0.6;

const TOP_THEMES: usize = 3;

#[async_trait]
pub trait SelfAwareness: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    /// Write a reflection memory. Returns false when skipped.
    async fn reflect(&self, force: bool) -> Result<bool>;

    async fn last_reflection(&self) -> Option<DateTime<Utc>>;
}

pub struct SelfAwarenessSystem {
    memory: Arc<dyn MemoryManager>,
    interval: chrono::Duration,
    last_reflection: RwLock<Option<DateTime<Utc>>>,
}

impl SelfAwarenessSystem {
    pub fn new(memory: Arc<dyn MemoryManager>, interval: chrono::Duration) -> Self {
        Self {
            memory,
            interval,
            last_reflection: RwLock::new(None),
        }
    }
}

/// What a reflection found in a batch of memories.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionSummary {
    pub memory_count: usize,
    pub dominant_emotion: Option<String>,
    pub average_valence: Option<f64>,
    pub top_themes: Vec<String>,
}

impl ReflectionSummary {
    pub fn from_memories(memories: &[Memory]) -> Self {
        let mut emotions: HashMap<&str, usize> = HashMap::new();
        let mut valences = Vec::new();
        for ctx in memories.iter().filter_map(|m| m.emotional_context.as_ref()) {
            *emotions.entry(ctx.primary.as_str()).or_insert(0) += 1;
            valences.push(ctx.valence);
        }
        let dominant_emotion = emotions
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(e, _)| e.to_string());
        let average_valence =
            (!valences.is_empty()).then(|| valences.iter().sum::<f64>() / valences.len() as f64);

        let mut themes: HashMap<String, usize> = HashMap::new();
        for theme in memories.iter().flat_map(|m| &m.themes) {
            *themes.entry(theme.to_lowercase()).or_insert(0) += 1;
        }
        let mut themes: Vec<(String, usize)> = themes.into_iter().collect();
        themes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let top_themes = themes
            .into_iter()
            .take(TOP_THEMES)
            .map(|(t, _)| t)
            .collect();

        Self {
            memory_count: memories.len(),
            dominant_emotion,
            average_valence,
            top_themes,
        }
    }

    pub fn render(&self) -> String {
        if self.memory_count == 0 {
            return "Reflected on 0 memories. Nothing new has happened since my last reflection."
                .to_string();
        }
        let mut out = format!("Reflected on {} memories.", self.memory_count);
        if let Some(emotion) = &self.dominant_emotion {
            out.push_str(&format!(" Dominant emotion: {emotion}."));
        }
        if let Some(valence) = self.average_valence {
            out.push_str(&format!(" Average valence: {valence:.2}."));
        }
        if !self.top_themes.is_empty() {
            out.push_str(&format!(" Recurring themes: {}.", self.top_themes.join(", ")));
        }
        out
    }
}

#[async_trait]
impl SelfAwareness for SelfAwarenessSystem {
    /// Resume from the newest reflection on disk.
    async fn initialize(&self) -> Result<()> {
        let query = MemoryQuery::all()
            .with_type(MemoryType::Reflection)
            .with_limit(1);
        let newest = self.memory.get_memories(&query).await?;
        *self.last_reflection.write().await = newest.first().map(Memory::created_at);
        Ok(())
    }

    async fn reflect(&self, force: bool) -> Result<bool> {
        let at = now();
        let mut last = self.last_reflection.write().await;
        if !force && !is_due(*last, self.interval, at) {
            return Ok(false);
        }

        let mut query = MemoryQuery::all();
        if let Some(since) = *last {
            query = query.since(since);
        }
        let recent: Vec<Memory> = self
            .memory
            .get_memories(&query)
            .await?
            .into_iter()
            .filter(|m| m.memory_type != MemoryType::Reflection)
            .collect();
        if recent.is_empty() && !force {
            return Ok(false);
        }

        let summary = ReflectionSummary::from_memories(&recent);
        let reflection = Memory::new(MemoryType::Reflection, summary.render())
            .with_importance(REFLECTION_IMPORTANCE)
            .with_themes(summary.top_themes.clone())
            .with_metadata("memory_count", json!(summary.memory_count))
            .with_metadata("dominant_emotion", json!(summary.dominant_emotion));
        self.memory.add_memory(reflection).await?;

        *last = Some(at);
        METRICS.inc_reflections();
        obs::emit_reflection(summary.memory_count);
        Ok(true)
    }

    async fn last_reflection(&self) -> Option<DateTime<Utc>> {
        *self.last_reflection.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmotionalContext;

    fn memory(primary: &str, valence: f64, themes: &[&str]) -> Memory {
        Memory::new(MemoryType::Conversation, "x")
            .with_themes(themes.iter().copied())
            .with_emotional_context(EmotionalContext::new(primary, 0.5, valence, 0.5))
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = ReflectionSummary::from_memories(&[]);
        assert_eq!(summary.memory_count, 0);
        assert!(summary.dominant_emotion.is_none());
        assert!(summary.render().starts_with("Reflected on 0 memories"));
    }

    #[test]
    fn test_summary_finds_dominant_emotion_and_themes() {
        let summary = ReflectionSummary::from_memories(&[
            memory("joy", 0.8, &["music", "art"]),
            memory("joy", 0.6, &["music"]),
            memory("sadness", -0.5, &["rain"]),
        ]);
        assert_eq!(summary.dominant_emotion.as_deref(), Some("joy"));
        assert!((summary.average_valence.unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(summary.top_themes[0], "music");

        let text = summary.render();
        assert!(text.contains("Reflected on 3 memories."));
        assert!(text.contains("Dominant emotion: joy."));
        assert!(text.contains("Average valence: 0.30."));
    }
}
