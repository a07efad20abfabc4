//! Structured observability hooks for Ava lifecycle events.
//!
//! Events are emitted at `info!` level unless noted; set
//! `RUST_LOG=ava_core=debug` for more detail.

use tracing::info;

/// RAII guard that enters a session-scoped span for a chat session.
///
/// ```ignore
/// let _span = SessionSpan::enter("chat-1");
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        Self {
            _span: session_span(session_id).entered(),
        }
    }
}

/// Span for a chat session, for use with `tracing::Instrument`.
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("ava.session", session_id = %session_id)
}

pub fn emit_orchestrator_started(tasks: usize) {
    info!(event = "orchestrator.started", tasks = tasks);
}

pub fn emit_orchestrator_stopped(uptime_secs: i64) {
    info!(event = "orchestrator.stopped", uptime_secs = uptime_secs);
}

/// Emit event: a periodic task tick failed (warning level).
pub fn emit_task_failed(task: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "task.failed", task = %task, error = %error);
}

pub fn emit_message_processed(primary_emotion: &str, intensity: f64, memories_used: usize) {
    info!(
        event = "conversation.message_processed",
        primary_emotion = %primary_emotion,
        intensity = intensity,
        memories_used = memories_used,
    );
}

pub fn emit_reflection(memories_considered: usize) {
    info!(event = "awareness.reflected", memories_considered);
}

pub fn emit_consolidation(merged_groups: usize, pruned: usize) {
    info!(
        event = "consolidation.completed",
        merged_groups = merged_groups,
        pruned = pruned,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_create() {
        let _span = SessionSpan::enter("test-session");
    }
}
