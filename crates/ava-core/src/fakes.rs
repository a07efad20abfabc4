//! In-memory fakes for the subsystem traits (testing only).
//!
//! Provides `InMemoryMemoryManager`, `FailingMemoryManager`, `ScriptedLlm`
//! and call-recording personality/awareness/consolidation fakes. The
//! recording fakes share a [`CallLog`] so tests can assert on ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::awareness::SelfAwareness;
use crate::consolidation::MemoryConsolidation;
use crate::error::{AvaError, Result};
use crate::llm::{LlmClient, LlmError, LlmResult, Message};
use crate::memory::{
    similarity, MemoryError, MemoryManager, MemoryPatch, MemoryQuery, MemoryStats,
    RetentionPolicy,
};
use crate::models::{ErrorRecord, Memory};
use crate::personality::{PersonalityEngine, PersonalityState, PersonalitySummary};
use crate::time::now;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// CallLog
// ---------------------------------------------------------------------------

/// Ordered record of calls made on the recording fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, call: impl Into<String>) {
        lock(&self.0).push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    pub fn count(&self, call: &str) -> usize {
        lock(&self.0).iter().filter(|c| c.as_str() == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        lock(&self.0).iter().position(|c| c == call)
    }
}

// ---------------------------------------------------------------------------
// InMemoryMemoryManager
// ---------------------------------------------------------------------------

/// Memory manager backed by a `HashMap`. Adds are logged as
/// `add_memory(<type>)`.
#[derive(Debug, Default)]
pub struct InMemoryMemoryManager {
    memories: Mutex<HashMap<String, Memory>>,
    errors: Mutex<VecDeque<ErrorRecord>>,
    log: CallLog,
}

impl InMemoryMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn all(&self) -> Vec<Memory> {
        MemoryQuery::all().apply(lock(&self.memories).values())
    }
}

#[async_trait]
impl MemoryManager for InMemoryMemoryManager {
    /// Yields once, as a store doing real I/O would.
    async fn initialize(&self) -> Result<()> {
        self.log.push("memory.initialize");
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn add_memory(&self, memory: Memory) -> Result<String> {
        self.log.push(format!("add_memory({})", memory.memory_type));
        let id = memory.id.clone();
        lock(&self.memories).insert(id.clone(), memory);
        Ok(id)
    }

    async fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let mut memories = lock(&self.memories);
        Ok(memories.get_mut(id).map(|m| {
            m.record_access();
            m.clone()
        }))
    }

    async fn get_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>> {
        Ok(query.apply(lock(&self.memories).values()))
    }

    async fn get_relevant_memories(
        &self,
        text: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        let needle = similarity::term_vector(text);
        let memories = lock(&self.memories);
        let mut ranked: Vec<(f64, Memory)> = memories
            .values()
            .filter_map(|m| {
                let sim = similarity::cosine(&needle, &similarity::memory_vector(m));
                (sim > 0.0).then(|| (similarity::relevance(sim, m.importance), m.clone()))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked.truncate(limit.unwrap_or(5));
        Ok(ranked.into_iter().map(|(_, m)| m).collect())
    }

    async fn search_memories(
        &self,
        query: &str,
        min_similarity: f64,
    ) -> Result<Vec<(Memory, f64)>> {
        let needle = similarity::term_vector(query);
        let mut hits: Vec<(Memory, f64)> = lock(&self.memories)
            .values()
            .filter_map(|m| {
                let sim = similarity::cosine(&needle, &similarity::memory_vector(m));
                (sim > 0.0 && sim >= min_similarity).then(|| (m.clone(), sim))
            })
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(hits)
    }

    async fn update_memory(&self, id: &str, patch: MemoryPatch) -> Result<Memory> {
        let mut memories = lock(&self.memories);
        let memory = memories
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound { id: id.to_string() })?;
        patch.apply_to(memory)?;
        Ok(memory.clone())
    }

    async fn delete_memory(&self, id: &str) -> Result<bool> {
        Ok(lock(&self.memories).remove(id).is_some())
    }

    async fn record_error(&self, record: ErrorRecord) -> Result<()> {
        self.log.push(format!("record_error({})", record.source));
        lock(&self.errors).push_front(record);
        Ok(())
    }

    async fn get_recent_errors(&self, limit: usize) -> Result<Vec<ErrorRecord>> {
        Ok(lock(&self.errors).iter().take(limit).cloned().collect())
    }

    async fn stats(&self) -> Result<MemoryStats> {
        Ok(MemoryStats::from_memories(lock(&self.memories).values()))
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
        let mut memories = lock(&self.memories);
        let expired = policy.select(memories.values(), now());
        for id in &expired {
            memories.remove(id);
        }
        Ok(expired)
    }
}

// ---------------------------------------------------------------------------
// FailingMemoryManager
// ---------------------------------------------------------------------------

/// Memory manager whose every operation fails with `message`.
#[derive(Debug, Clone)]
pub struct FailingMemoryManager {
    message: String,
}

impl FailingMemoryManager {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(AvaError::Memory(MemoryError::Io(std::io::Error::other(
            self.message.clone(),
        ))))
    }
}

#[async_trait]
impl MemoryManager for FailingMemoryManager {
    async fn initialize(&self) -> Result<()> {
        self.fail()
    }

    async fn add_memory(&self, _memory: Memory) -> Result<String> {
        self.fail()
    }

    async fn get_memory(&self, _id: &str) -> Result<Option<Memory>> {
        self.fail()
    }

    async fn get_memories(&self, _query: &MemoryQuery) -> Result<Vec<Memory>> {
        self.fail()
    }

    async fn get_relevant_memories(
        &self,
        _text: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        self.fail()
    }

    async fn search_memories(
        &self,
        _query: &str,
        _min_similarity: f64,
    ) -> Result<Vec<(Memory, f64)>> {
        self.fail()
    }

    async fn update_memory(&self, _id: &str, _patch: MemoryPatch) -> Result<Memory> {
        self.fail()
    }

    async fn delete_memory(&self, _id: &str) -> Result<bool> {
        self.fail()
    }

    async fn record_error(&self, _record: ErrorRecord) -> Result<()> {
        self.fail()
    }

    async fn get_recent_errors(&self, _limit: usize) -> Result<Vec<ErrorRecord>> {
        self.fail()
    }

    async fn stats(&self) -> Result<MemoryStats> {
        self.fail()
    }

    async fn prune_expired(
        &self,
        _max_age_days: i64,
        _keep_min_importance: f64,
    ) -> Result<Vec<String>> {
        self.fail()
    }
}

// ---------------------------------------------------------------------------
// ScriptedLlm
// ---------------------------------------------------------------------------

type Scripted = std::result::Result<String, String>;

/// Language model that replays scripted replies, then falls back to a fixed
/// outcome. `Err(message)` surfaces as `LlmError::Api { status: 500, .. }`.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<Scripted>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    /// Always answers `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(Ok(reply.into())),
            ..Self::default()
        }
    }

    /// Always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fallback: Some(Err(message.into())),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.script).push_back(Ok(reply.into()));
    }

    pub fn push_err(&self, message: impl Into<String>) {
        lock(&self.script).push_back(Err(message.into()));
    }

    /// Every message list sent so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate_response(&self, messages: &[Message]) -> LlmResult<String> {
        lock(&self.requests).push(messages.to_vec());
        let next = lock(&self.script).pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(LlmError::Api {
                status: 500,
                message,
            }),
            None => Err(LlmError::EmptyResponse),
        }
    }
}

// ---------------------------------------------------------------------------
// Recording subsystems
// ---------------------------------------------------------------------------

/// Personality engine that records `update_personality(force=..)` calls.
#[derive(Debug, Default)]
pub struct RecordingPersonality {
    log: CallLog,
    state: PersonalityState,
}

impl RecordingPersonality {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            state: PersonalityState::default(),
        }
    }
}

#[async_trait]
impl PersonalityEngine for RecordingPersonality {
    async fn initialize(&self) -> Result<()> {
        self.log.push("personality.initialize");
        Ok(())
    }

    async fn update_personality(&self, force: bool) -> Result<bool> {
        self.log.push(format!("update_personality(force={force})"));
        Ok(true)
    }

    async fn get_personality_summary(&self) -> Result<PersonalitySummary> {
        Ok(self.state.summary())
    }
}

/// Self-awareness that records `reflect(force=..)` calls.
#[derive(Debug, Default)]
pub struct RecordingAwareness {
    log: CallLog,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl RecordingAwareness {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SelfAwareness for RecordingAwareness {
    async fn initialize(&self) -> Result<()> {
        self.log.push("awareness.initialize");
        Ok(())
    }

    async fn reflect(&self, force: bool) -> Result<bool> {
        self.log.push(format!("reflect(force={force})"));
        *lock(&self.last) = Some(now());
        Ok(true)
    }

    async fn last_reflection(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last)
    }
}

/// Consolidation that records `consolidate_memories(force=..)` calls and can
/// be told to fail.
#[derive(Debug, Default)]
pub struct RecordingConsolidation {
    log: CallLog,
    fail_with: Option<String>,
}

impl RecordingConsolidation {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_with: None,
        }
    }

    pub fn failing(log: CallLog, message: impl Into<String>) -> Self {
        Self {
            log,
            fail_with: Some(message.into()),
        }
    }
}

#[async_trait]
impl MemoryConsolidation for RecordingConsolidation {
    async fn consolidate_memories(&self, force: bool) -> Result<bool> {
        self.log.push(format!("consolidate_memories(force={force})"));
        match &self.fail_with {
            Some(message) => Err(AvaError::InvalidInput(message.clone())),
            None => Ok(true),
        }
    }

    async fn last_consolidation(&self) -> Option<DateTime<Utc>> {
        None
    }
}
