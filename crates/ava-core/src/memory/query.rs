//! Query, patch and statistics types for the memory store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{MemoryError, MemoryResult};
use crate::models::{Memory, MemoryType};
use crate::time::lenient_option;

/// Filter for listing memories. Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryQuery {
    pub memory_type: Option<MemoryType>,
    pub theme: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl MemoryQuery {
    /// Query that matches all memories.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn with_theme(mut self, theme: &str) -> Self {
        self.theme = Some(theme.to_string());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, memory: &Memory) -> bool {
        if self.memory_type.is_some_and(|t| t != memory.memory_type) {
            return false;
        }
        if let Some(theme) = &self.theme {
            if !memory.has_theme(theme) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if memory.created_at() < since {
                return false;
            }
        }
        true
    }

    /// Filter, sort newest first and truncate.
    pub fn apply<'a, I>(&self, memories: I) -> Vec<Memory>
    where
        I: IntoIterator<Item = &'a Memory>,
    {
        let mut out: Vec<Memory> = memories
            .into_iter()
            .filter(|m| self.matches(m))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// Partial update of a memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub themes: Option<Vec<String>>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.importance.is_none() && self.themes.is_none()
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if let Some(importance) = self.importance {
            if !(0.0..=1.0).contains(&importance) {
                return Err(MemoryError::InvalidPatch(format!(
                    "importance must be within [0, 1], got {importance}"
                )));
            }
        }
        if self.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(MemoryError::InvalidPatch("content must not be empty".into()));
        }
        Ok(())
    }

    /// Apply to `memory` and touch its `updated_at`.
    pub fn apply_to(&self, memory: &mut Memory) -> MemoryResult<()> {
        self.validate()?;
        if let Some(content) = &self.content {
            memory.content = content.clone();
        }
        if let Some(importance) = self.importance {
            memory.importance = importance;
        }
        if let Some(themes) = &self.themes {
            memory.themes = themes.clone();
        }
        memory.timestamps.touch();
        Ok(())
    }
}

/// Summary of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub average_importance: f64,
    #[serde(with = "lenient_option", default)]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(with = "lenient_option", default)]
    pub newest: Option<DateTime<Utc>>,
}

impl MemoryStats {
    pub fn from_memories<'a, I>(memories: I) -> Self
    where
        I: IntoIterator<Item = &'a Memory>,
    {
        let mut stats = Self::default();
        for t in MemoryType::ALL {
            stats.by_type.insert(t.as_str().to_string(), 0);
        }
        let mut importance_sum = 0.0;
        for memory in memories {
            stats.total += 1;
            importance_sum += memory.importance;
            *stats
                .by_type
                .entry(memory.memory_type.as_str().to_string())
                .or_insert(0) += 1;
            let created = memory.created_at();
            stats.oldest = Some(stats.oldest.map_or(created, |o| o.min(created)));
            stats.newest = Some(stats.newest.map_or(created, |n| n.max(created)));
        }
        if stats.total > 0 {
            stats.average_importance = importance_sum / stats.total as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timestamps;
    use chrono::Duration;

    fn memory(id: &str, t: MemoryType, age_hours: i64) -> Memory {
        let mut m = Memory::new(t, format!("memory {id}")).with_id(id);
        m.timestamps = Timestamps::at(Utc::now() - Duration::hours(age_hours));
        m
    }

    #[test]
    fn test_query_sorts_newest_first_and_limits() {
        let all = [
            memory("old", MemoryType::Conversation, 10),
            memory("new", MemoryType::Conversation, 1),
            memory("mid", MemoryType::Conversation, 5),
        ];
        let out = MemoryQuery::all().with_limit(2).apply(&all);
        let ids: Vec<_> = out.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn test_query_filters() {
        let all = [
            memory("a", MemoryType::Core, 1).with_themes(["identity"]),
            memory("b", MemoryType::Conversation, 1),
            memory("c", MemoryType::Conversation, 48),
        ];
        let core = MemoryQuery::all().with_type(MemoryType::Core);
        assert_eq!(core.apply(&all).len(), 1);
        let identity = MemoryQuery::all().with_theme("IDENTITY");
        assert_eq!(identity.apply(&all).len(), 1);
        let day = MemoryQuery::all().since(Utc::now() - Duration::hours(24));
        let recent = day.apply(&all);
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_patch_rejects_out_of_range_importance() {
        let patch = MemoryPatch {
            importance: Some(1.2),
            ..MemoryPatch::default()
        };
        assert!(matches!(patch.validate(), Err(MemoryError::InvalidPatch(_))));
    }

    #[test]
    fn test_patch_applies_and_touches() {
        let mut m = memory("x", MemoryType::Personal, 1);
        let patch = MemoryPatch {
            content: Some("Updated content".into()),
            importance: Some(0.9),
            themes: Some(vec!["edited".into()]),
        };
        patch.apply_to(&mut m).unwrap();
        assert_eq!(m.content, "Updated content");
        assert_eq!(m.importance, 0.9);
        assert!(m.has_theme("edited"));
        assert!(m.timestamps.updated_at.is_some());
    }

    #[test]
    fn test_stats_empty_and_populated() {
        let empty = MemoryStats::from_memories(&Vec::<Memory>::new());
        assert_eq!(empty.total, 0);
        assert_eq!(empty.by_type["core"], 0);
        assert!(empty.oldest.is_none());

        let all = [
            memory("a", MemoryType::Core, 2).with_importance(1.0),
            memory("b", MemoryType::Conversation, 1).with_importance(0.5),
        ];
        let stats = MemoryStats::from_memories(&all);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_type["core"], 1);
        assert!((stats.average_importance - 0.75).abs() < 1e-9);
        assert!(stats.oldest < stats.newest);
    }
}
