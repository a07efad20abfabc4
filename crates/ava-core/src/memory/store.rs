//! File-backed memory store.
//!
//! Layout: `<memory_dir>/<memory_type>/<id>.json`, one pretty-printed JSON
//! document per memory, plus `<memory_dir>/errors.json` for the error log.
//! The whole tree is loaded into an in-process index on `initialize`.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::MemoryError;
use super::query::{MemoryPatch, MemoryQuery, MemoryStats};
use super::retention::RetentionPolicy;
use super::similarity::{cosine, memory_vector, relevance, term_vector};
use super::MemoryManager;
use crate::config::{ConfigResult, MemoryConfig, Settings};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::models::{ErrorRecord, Memory, MemoryType};
use crate::storage;
use crate::time::now;

/// File name of the persisted error log inside the memory directory.
pub const ERROR_LOG_FILE: &str = "errors.json";

#[derive(Default)]
struct Index {
    memories: HashMap<String, Memory>,
    /// Newest first.
    errors: VecDeque<ErrorRecord>,
}

pub struct FileMemoryStore {
    root: PathBuf,
    config: MemoryConfig,
    index: RwLock<Index>,
}

impl FileMemoryStore {
    pub fn new(root: impl Into<PathBuf>, config: MemoryConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            root: root.into(),
            config,
            index: RwLock::new(Index::default()),
        })
    }

    pub fn from_settings(settings: &Settings) -> ConfigResult<Self> {
        Self::new(settings.memory_dir(), settings.memory.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn memory_path(&self, memory: &Memory) -> PathBuf {
        self.root
            .join(memory.memory_type.as_str())
            .join(format!("{}.json", memory.id))
    }

    fn write_memory(&self, memory: &Memory) -> std::result::Result<(), MemoryError> {
        storage::write_json_atomic(&self.memory_path(memory), memory)?;
        Ok(())
    }

    fn remove_file(&self, memory: &Memory) -> std::result::Result<(), MemoryError> {
        match fs::remove_file(self.memory_path(memory)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_errors(
        &self,
        errors: &VecDeque<ErrorRecord>,
    ) -> std::result::Result<(), MemoryError> {
        storage::write_json_atomic(&self.root.join(ERROR_LOG_FILE), errors)?;
        Ok(())
    }

    fn load_type_dir(
        &self,
        memory_type: MemoryType,
        into: &mut HashMap<String, Memory>,
    ) -> std::result::Result<(), MemoryError> {
        let dir = self.root.join(memory_type.as_str());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension() != Some(OsStr::new("json")) {
                continue;
            }
            match storage::read_json_opt::<Memory>(&path) {
                Ok(Some(memory)) if memory.memory_type == memory_type => {
                    into.insert(memory.id.clone(), memory);
                }
                Ok(Some(memory)) => {
                    tracing::warn!(
                        path = %path.display(),
                        memory_type = %memory.memory_type,
                        "memory stored under the wrong type directory, skipping"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable memory file"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Ids become file names, so keep them to a conservative alphabet.
fn check_id(id: &str) -> std::result::Result<(), MemoryError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(MemoryError::InvalidId(id.to_string()))
    }
}

#[async_trait]
impl MemoryManager for FileMemoryStore {
    async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(MemoryError::from)?;

        let mut memories = HashMap::new();
        for memory_type in MemoryType::ALL {
            self.load_type_dir(memory_type, &mut memories)?;
        }

        let errors_path = self.root.join(ERROR_LOG_FILE);
        let mut errors: VecDeque<ErrorRecord> = match storage::read_json_opt(&errors_path) {
            Ok(errors) => errors.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    path = %errors_path.display(),
                    error = %e,
                    "discarding unreadable error log"
                );
                VecDeque::new()
            }
        };
        errors.truncate(self.config.error_log_capacity);

        tracing::info!(
            root = %self.root.display(),
            memories = memories.len(),
            errors = errors.len(),
            "memory store initialized"
        );
        *self.index.write().await = Index { memories, errors };
        Ok(())
    }

    async fn add_memory(&self, memory: Memory) -> Result<String> {
        check_id(&memory.id)?;
        let mut index = self.index.write().await;
        if let Some(previous) = index.memories.get(&memory.id) {
            if previous.memory_type != memory.memory_type {
                self.remove_file(previous)?;
            }
        }
        self.write_memory(&memory)?;
        let id = memory.id.clone();
        tracing::debug!(id = %id, memory_type = %memory.memory_type, "memory stored");
        index.memories.insert(id.clone(), memory);
        METRICS.inc_memories_stored();
        Ok(id)
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let mut index = self.index.write().await;
        let Some(memory) = index.memories.get_mut(id) else {
            return Ok(None);
        };
        memory.record_access();
        let memory = memory.clone();
        self.write_memory(&memory)?;
        Ok(Some(memory))
    }

    async fn get_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>> {
        let index = self.index.read().await;
        Ok(query.apply(index.memories.values()))
    }

    async fn get_relevant_memories(
        &self,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        let needle = term_vector(text);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(self.config.retrieval_limit);

        let mut index = self.index.write().await;
        let mut ranked: Vec<(f64, String)> = index
            .memories
            .values()
            .filter_map(|m| {
                let sim = cosine(&needle, &memory_vector(m));
                (sim > 0.0).then(|| (relevance(sim, m.importance), m.id.clone()))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        ranked.truncate(limit);

        let mut out = Vec::with_capacity(ranked.len());
        for (_, id) in ranked {
            if let Some(memory) = index.memories.get_mut(&id) {
                memory.record_access();
                out.push(memory.clone());
            }
        }
        for memory in &out {
            self.write_memory(memory)?;
        }
        Ok(out)
    }

    async fn search_memories(
        &self,
        query: &str,
        min_similarity: f64,
    ) -> Result<Vec<(Memory, f64)>> {
        let needle = term_vector(query);
        let index = self.index.read().await;
        let mut hits: Vec<(Memory, f64)> = index
            .memories
            .values()
            .filter_map(|m| {
                let sim = cosine(&needle, &memory_vector(m));
                (sim > 0.0 && sim >= min_similarity).then(|| (m.clone(), sim))
            })
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        Ok(hits)
    }

    async fn update_memory(&self, id: &str, patch: MemoryPatch) -> Result<Memory> {
        let mut index = self.index.write().await;
        let memory = index
            .memories
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound { id: id.to_string() })?;
        let mut updated = memory.clone();
        patch.apply_to(&mut updated)?;
        self.write_memory(&updated)?;
        *memory = updated.clone();
        tracing::debug!(id = %id, "memory updated");
        Ok(updated)
    }

    async fn delete_memory(&self, id: &str) -> Result<bool> {
        let mut index = self.index.write().await;
        let Some(memory) = index.memories.remove(id) else {
            return Ok(false);
        };
        if let Err(e) = self.remove_file(&memory) {
            index.memories.insert(memory.id.clone(), memory);
            return Err(e.into());
        }
        Ok(true)
    }

    async fn record_error(&self, record: ErrorRecord) -> Result<()> {
        let mut index = self.index.write().await;
        index.errors.push_front(record);
        index.errors.truncate(self.config.error_log_capacity);
        self.write_errors(&index.errors)?;
        Ok(())
    }

    async fn get_recent_errors(&self, limit: usize) -> Result<Vec<ErrorRecord>> {
        let index = self.index.read().await;
        Ok(index.errors.iter().take(limit).cloned().collect())
    }

    async fn stats(&self) -> Result<MemoryStats> {
        let index = self.index.read().await;
        Ok(MemoryStats::from_memories(index.memories.values()))
    }

    async fn prune_expired(
        &self,
        max_age_days: i64,
        keep_min_importance: f64,
    ) -> Result<Vec<String>> {
        let policy = RetentionPolicy {
            max_age_days,
            keep_min_importance,
        };
        let mut index = self.index.write().await;
        let expired = policy.select(index.memories.values(), now());
        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            let Some(memory) = index.memories.remove(&id) else {
                continue;
            };
            if let Err(e) = self.remove_file(&memory) {
                index.memories.insert(id, memory);
                return Err(e.into());
            }
            removed.push(id);
        }
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "expired memories pruned");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AvaError;
    use crate::models::{Severity, Timestamps};
    use chrono::{Duration, Utc};

    async fn make_store() -> (tempfile::TempDir, FileMemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FileMemoryStore::new(dir.path().join("memories"), MemoryConfig::default()).unwrap();
        store.initialize().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_add_writes_file_under_type_dir() {
        let (dir, store) = make_store().await;
        let id = store
            .add_memory(Memory::new(MemoryType::Core, "I am Ava").with_id("core-1"))
            .await
            .unwrap();
        assert_eq!(id, "core-1");
        assert!(dir.path().join("memories/core/core-1.json").exists());
    }

    #[tokio::test]
    async fn test_reload_from_disk() {
        let (dir, store) = make_store().await;
        store
            .add_memory(Memory::new(MemoryType::Personal, "likes tea").with_id("p1"))
            .await
            .unwrap();
        fs::write(dir.path().join("memories/personal/broken.json"), "{").unwrap();

        let reopened =
            FileMemoryStore::new(dir.path().join("memories"), MemoryConfig::default()).unwrap();
        reopened.initialize().await.unwrap();
        let all = reopened.get_memories(&MemoryQuery::all()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "likes tea");
    }

    #[tokio::test]
    async fn test_get_memory_records_access() {
        let (_dir, store) = make_store().await;
        store
            .add_memory(Memory::new(MemoryType::Core, "x").with_id("m"))
            .await
            .unwrap();
        store.get_memory("m").await.unwrap();
        let m = store.get_memory("m").await.unwrap().unwrap();
        assert_eq!(m.access_count, 2);
        assert!(store.get_memory("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let (_dir, store) = make_store().await;
        let err = store
            .add_memory(Memory::new(MemoryType::Core, "x").with_id("../escape"))
            .await
            .unwrap_err();
        assert!(matches!(err, AvaError::Memory(MemoryError::InvalidId(_))));
    }

    #[tokio::test]
    async fn test_relevant_memories_rank_and_skip_unrelated() {
        let (_dir, store) = make_store().await;
        let stars = "We talked about the stars and astronomy";
        store
            .add_memory(
                Memory::new(MemoryType::Conversation, stars)
                    .with_id("stars")
                    .with_importance(0.4),
            )
            .await
            .unwrap();
        store
            .add_memory(
                Memory::new(MemoryType::Conversation, "Astronomy is a favourite topic")
                    .with_id("astro")
                    .with_importance(0.9),
            )
            .await
            .unwrap();
        let pasta = Memory::new(MemoryType::Conversation, "Cooking pasta").with_id("pasta");
        store.add_memory(pasta).await.unwrap();

        let hits = store
            .get_relevant_memories("any astronomy news?", None)
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["astro", "stars"]);
        assert_eq!(hits[0].access_count, 1);

        let limited = store
            .get_relevant_memories("astronomy", Some(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_search_respects_min_similarity() {
        let (_dir, store) = make_store().await;
        let weather = Memory::new(MemoryType::Personal, "rainy weather").with_id("w");
        store.add_memory(weather).await.unwrap();
        let hits = store.search_memories("weather", 0.1).await.unwrap();
        assert_eq!(hits.len(), 1);
        let strict = store.search_memories("weather", 0.99).await.unwrap();
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let (_dir, store) = make_store().await;
        let err = store
            .update_memory("nope", MemoryPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AvaError::Memory(MemoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_persists() {
        let (dir, store) = make_store().await;
        store
            .add_memory(Memory::new(MemoryType::Personal, "old").with_id("u"))
            .await
            .unwrap();
        let patch = MemoryPatch {
            content: Some("new".into()),
            ..MemoryPatch::default()
        };
        store.update_memory("u", patch).await.unwrap();

        let raw = fs::read_to_string(dir.path().join("memories/personal/u.json")).unwrap();
        assert!(raw.contains("\"new\""));
    }

    #[tokio::test]
    async fn test_delete() {
        let (dir, store) = make_store().await;
        store
            .add_memory(Memory::new(MemoryType::Reflection, "r").with_id("r"))
            .await
            .unwrap();
        assert!(store.delete_memory("r").await.unwrap());
        assert!(!store.delete_memory("r").await.unwrap());
        assert!(!dir.path().join("memories/reflection/r.json").exists());
    }

    #[tokio::test]
    async fn test_error_log_is_bounded_and_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryConfig {
            error_log_capacity: 3,
            ..MemoryConfig::default()
        };
        let store = FileMemoryStore::new(dir.path(), config.clone()).unwrap();
        store.initialize().await.unwrap();
        for i in 0..5 {
            store
                .record_error(ErrorRecord::new("test", Severity::Error, format!("e{i}")))
                .await
                .unwrap();
        }
        let errors = store.get_recent_errors(10).await.unwrap();
        let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["e4", "e3", "e2"]);

        let reopened = FileMemoryStore::new(dir.path(), config).unwrap();
        reopened.initialize().await.unwrap();
        let newest = reopened.get_recent_errors(1).await.unwrap();
        assert_eq!(newest[0].message, "e4");
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let (_dir, store) = make_store().await;
        let mut old = Memory::new(MemoryType::Conversation, "old chat").with_id("old");
        old.timestamps = Timestamps::at(Utc::now() - Duration::days(60));
        let mut core = Memory::new(MemoryType::Core, "identity").with_id("core");
        core.timestamps = Timestamps::at(Utc::now() - Duration::days(60));
        store.add_memory(old).await.unwrap();
        store.add_memory(core).await.unwrap();

        let removed = store.prune_expired(30, 0.8).await.unwrap();
        assert_eq!(removed, vec!["old"]);
        assert_eq!(store.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_prune_with_huge_age_keeps_everything() {
        let (_dir, store) = make_store().await;
        let mut old = Memory::new(MemoryType::Conversation, "old chat").with_id("old");
        old.timestamps = Timestamps::at(Utc::now() - Duration::days(3650));
        store.add_memory(old).await.unwrap();

        let removed = store.prune_expired(100_000_000, 0.8).await.unwrap();
        assert!(removed.is_empty());
        assert_eq!(store.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_index_entry_when_file_removal_fails() {
        let (dir, store) = make_store().await;
        let mut old = Memory::new(MemoryType::Conversation, "old chat").with_id("old");
        old.timestamps = Timestamps::at(Utc::now() - Duration::days(60));
        store.add_memory(old).await.unwrap();

        // A directory in place of the file makes the removal fail.
        let path = dir.path().join("memories/conversation/old.json");
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(store.prune_expired(30, 0.8).await.is_err());
        let all = store.get_memories(&MemoryQuery::all()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "old");
    }
}
