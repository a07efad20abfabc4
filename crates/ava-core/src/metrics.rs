//! Global atomic counters for Ava observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the orchestrator does so on shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    messages_processed: AtomicU64,
    memories_stored: AtomicU64,
    reflections: AtomicU64,
    consolidations: AtomicU64,
    task_failures: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_processed: u64,
    pub memories_stored: u64,
    pub reflections: u64,
    pub consolidations: u64,
    pub task_failures: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            messages_processed: AtomicU64::new(0),
            memories_stored: AtomicU64::new(0),
            reflections: AtomicU64::new(0),
            consolidations: AtomicU64::new(0),
            task_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_messages_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "messages_processed", "counter incremented");
    }

    pub fn inc_memories_stored(&self) {
        self.memories_stored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "memories_stored", "counter incremented");
    }

    pub fn inc_reflections(&self) {
        self.reflections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reflections", "counter incremented");
    }

    pub fn inc_consolidations(&self) {
        self.consolidations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "consolidations", "counter incremented");
    }

    pub fn inc_task_failures(&self) {
        self.task_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "task_failures", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            memories_stored: self.memories_stored.load(Ordering::Relaxed),
            reflections: self.reflections.load(Ordering::Relaxed),
            consolidations: self.consolidations.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            messages_processed = s.messages_processed,
            memories_stored = s.memories_stored,
            reflections = s.reflections,
            consolidations = s.consolidations,
            task_failures = s.task_failures,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.messages_processed.store(0, Ordering::Relaxed);
        self.memories_stored.store(0, Ordering::Relaxed);
        self.reflections.store(0, Ordering::Relaxed);
        self.consolidations.store(0, Ordering::Relaxed);
        self.task_failures.store(0, Ordering::Relaxed);
    }
}
