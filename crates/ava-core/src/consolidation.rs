//! Merging related conversation memories and expiring stale ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::memory::{MemoryManager, MemoryQuery, KEEP_MIN_IMPORTANCE};
use crate::metrics::METRICS;
use crate::models::{Memory, MemoryType};
use crate::obs;
use crate::time::{is_due, now};

/// Conversations younger than this are left alone.
pub const MIN_AGE_HOURS: i64 = 1;

/// Groups need at least this many members to be merged.
pub const MIN_GROUP_SIZE: usize = 3;

const SNIPPET_CHARS: usize = 200;

#[async_trait]
pub trait MemoryConsolidation: Send + Sync {
    /// Returns true when anything changed, or when forced.
    async fn consolidate_memories(&self, force: bool) -> Result<bool>;

    async fn last_consolidation(&self) -> Option<DateTime<Utc>>;
}

pub struct ConsolidationSystem {
    memory: Arc<dyn MemoryManager>,
    interval: Duration,
    max_memory_age_days: i64,
    last: RwLock<Option<DateTime<Utc>>>,
}

impl ConsolidationSystem {
    pub fn new(
        memory: Arc<dyn MemoryManager>,
        interval: Duration,
        max_memory_age_days: i64,
    ) -> Self {
        Self {
            memory,
            interval,
            max_memory_age_days,
            last: RwLock::new(None),
        }
    }
}

/// Group key of a conversation memory: its first theme, lower-cased.
pub fn group_key(memory: &Memory) -> String {
    memory
        .themes
        .first()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "general".to_string())
}

/// Conversation memories old enough to consolidate, grouped by theme.
/// Only groups of at least [`MIN_GROUP_SIZE`] are returned.
pub fn plan_groups(memories: &[Memory], at: DateTime<Utc>) -> BTreeMap<String, Vec<Memory>> {
    let cutoff = at - Duration::hours(MIN_AGE_HOURS);
    let mut groups: BTreeMap<String, Vec<Memory>> = BTreeMap::new();
    for memory in memories {
        if memory.memory_type == MemoryType::Conversation && memory.created_at() < cutoff {
            groups
                .entry(group_key(memory))
                .or_default()
                .push(memory.clone());
        }
    }
    groups.retain(|_, members| members.len() >= MIN_GROUP_SIZE);
    groups
}

/// One consolidated memory standing in for `members`.
pub fn merge_group(theme: &str, members: &[Memory]) -> Memory {
    let mut ordered: Vec<&Memory> = members.iter().collect();
    ordered.sort_by_key(|m| m.created_at());

    let count = ordered.len();
    let mut content = format!("Consolidated {count} conversations about {theme}:");
    for m in &ordered {
        content.push_str("\n- ");
        content.extend(m.content.chars().take(SNIPPET_CHARS));
    }

    let importance = ordered.iter().map(|m| m.importance).fold(0.0, f64::max);
    let mut themes: Vec<String> = Vec::new();
    for theme in ordered.iter().flat_map(|m| &m.themes) {
        if !themes.iter().any(|t| t.eq_ignore_ascii_case(theme)) {
            themes.push(theme.clone());
        }
    }
    let source_ids: Vec<&str> = ordered.iter().map(|m| m.id.as_str()).collect();

    Memory::new(MemoryType::Consolidated, content)
        .with_importance(importance)
        .with_themes(themes)
        .with_metadata("theme", json!(theme))
        .with_metadata("source_ids", json!(source_ids))
}

#[async_trait]
impl MemoryConsolidation for ConsolidationSystem {
    async fn consolidate_memories(&self, force: bool) -> Result<bool> {
        let at = now();
        let mut last = self.last.write().await;
        if !force && !is_due(*last, self.interval, at) {
            return Ok(false);
        }

        let conversations = self
            .memory
            .get_memories(&MemoryQuery::all().with_type(MemoryType::Conversation))
            .await?;
        let groups = plan_groups(&conversations, at);

        let mut merged = 0;
        for (theme, members) in &groups {
            // Write the merged memory before removing its sources.
            self.memory.add_memory(merge_group(theme, members)).await?;
            for m in members {
                self.memory.delete_memory(&m.id).await?;
            }
            merged += 1;
        }

        let pruned = self
            .memory
            .prune_expired(self.max_memory_age_days, KEEP_MIN_IMPORTANCE)
            .await?
            .len();

        *last = Some(at);
        METRICS.inc_consolidations();
        obs::emit_consolidation(merged, pruned);
        Ok(force || merged > 0 || pruned > 0)
    }

    async fn last_consolidation(&self) -> Option<DateTime<Utc>> {
        *self.last.read().await
    }
}
