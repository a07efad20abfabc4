//! Retention policy for expiring old, unimportant memories.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Memory, MemoryType};

/// Importance at or above which memories never expire.
pub const KEEP_MIN_IMPORTANCE: f64 = 0.8;

/// Which memories are eligible for pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Memories older than this many days expire.
    pub max_age_days: i64,
    /// Memories at least this important are kept regardless of age.
    pub keep_min_importance: f64,
}

impl RetentionPolicy {
    pub fn new(max_age_days: i64) -> Self {
        Self {
            max_age_days,
            keep_min_importance: KEEP_MIN_IMPORTANCE,
        }
    }

    /// Creation time before which memories expire, or `None` when the age
    /// reaches past the representable calendar.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        TimeDelta::try_days(self.max_age_days)
            .and_then(|age| now.checked_sub_signed(age))
    }

    /// Core memories are never expired.
    pub fn is_expired(&self, memory: &Memory, now: DateTime<Utc>) -> bool {
        let Some(cutoff) = self.cutoff(now) else {
            return false;
        };
        memory.memory_type != MemoryType::Core
            && memory.importance < self.keep_min_importance
            && memory.created_at() < cutoff
    }

    /// Ids of expired memories, oldest first.
    pub fn select<'a, I>(&self, memories: I, now: DateTime<Utc>) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Memory>,
    {
        let mut expired: Vec<&Memory> = memories
            .into_iter()
            .filter(|m| self.is_expired(m, now))
            .collect();
        expired.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id.cmp(&b.id))
        });
        expired.into_iter().map(|m| m.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timestamps;
    use chrono::Duration;

    fn memory(id: &str, t: MemoryType, age_days: i64, importance: f64) -> Memory {
        let mut m = Memory::new(t, "x").with_id(id).with_importance(importance);
        m.timestamps = Timestamps::at(Utc::now() - Duration::days(age_days));
        m
    }

    #[test]
    fn test_young_memories_are_kept() {
        let policy = RetentionPolicy::new(30);
        let all = [memory("a", MemoryType::Conversation, 1, 0.1)];
        assert!(policy.select(&all, Utc::now()).is_empty());
    }

    #[test]
    fn test_old_unimportant_memories_expire_oldest_first() {
        let policy = RetentionPolicy::new(30);
        let all = [
            memory("older", MemoryType::Conversation, 90, 0.2),
            memory("old", MemoryType::Reflection, 40, 0.5),
        ];
        assert_eq!(policy.select(&all, Utc::now()), vec!["older", "old"]);
    }

    #[test]
    fn test_core_and_important_memories_survive() {
        let policy = RetentionPolicy::new(30);
        let all = [
            memory("core", MemoryType::Core, 365, 0.1),
            memory("important", MemoryType::Conversation, 365, 0.8),
        ];
        assert!(policy.select(&all, Utc::now()).is_empty());
    }

    #[test]
    fn test_unrepresentable_age_expires_nothing() {
        let all = [memory("ancient", MemoryType::Conversation, 3650, 0.1)];
        for days in [100_000_000, i64::MAX] {
            let policy = RetentionPolicy::new(days);
            assert!(policy.cutoff(Utc::now()).is_none());
            assert!(policy.select(&all, Utc::now()).is_empty());
        }
    }
}
