//! Persistent memories: storage, retrieval by relevance, retention and the
//! operational error log.

pub mod error;
pub mod query;
pub mod retention;
pub mod similarity;
pub mod store;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ErrorRecord, Memory};

pub use error::{MemoryError, MemoryResult};
pub use query::{MemoryPatch, MemoryQuery, MemoryStats};
pub use retention::{RetentionPolicy, KEEP_MIN_IMPORTANCE};
pub use store::FileMemoryStore;

/// Memory subsystem driven by the orchestrator and the admin API.
#[async_trait]
pub trait MemoryManager: Send + Sync {
    /// (Re)load everything from the backing store.
    async fn initialize(&self) -> Result<()>;

    /// Store a memory, replacing any memory with the same id. Returns the id.
    async fn add_memory(&self, memory: Memory) -> Result<String>;

    /// Fetch one memory and count the access.
    async fn get_memory(&self, id: &str) -> Result<Option<Memory>>;

    async fn get_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>>;

    /// Memories related to `text`, best first. `None` uses the configured
    /// retrieval limit.
    async fn get_relevant_memories(&self, text: &str, limit: Option<usize>)
        -> Result<Vec<Memory>>;

    /// Memories with similarity of at least `min_similarity`, best first.
    async fn search_memories(
        &self,
        query: &str,
        min_similarity: f64,
    ) -> Result<Vec<(Memory, f64)>>;

    async fn update_memory(&self, id: &str, patch: MemoryPatch) -> Result<Memory>;

    /// Returns whether anything was deleted.
    async fn delete_memory(&self, id: &str) -> Result<bool>;

    async fn record_error(&self, record: ErrorRecord) -> Result<()>;

    /// Newest first.
    async fn get_recent_errors(&self, limit: usize) -> Result<Vec<ErrorRecord>>;

    async fn stats(&self) -> Result<MemoryStats>;

    /// Remove expired memories; returns the removed ids.
    async fn prune_expired(
        &self,
        max_age_days: i64,
        keep_min_importance: f64,
    ) -> Result<Vec<String>>;
}
