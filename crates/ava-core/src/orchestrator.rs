//! Lifecycle of Ava's subsystems and their periodic background tasks.
//!
//! [`Orchestrator::start`] initializes the memory and emotional subsystems
//! and spawns four periodic tasks (consolidation, reflection, personality
//! update, health check). [`Orchestrator::shutdown`] saves final state,
//! cancels the tasks and waits for them.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::awareness::{SelfAwareness, SelfAwarenessSystem};
use crate::config::{OrchestratorConfig, Settings};
use crate::consolidation::{ConsolidationSystem, MemoryConsolidation};
use crate::conversation::ConversationHandler;
use crate::emotion::{EmotionalEngine, EmotionalSystem};
use crate::error::{AvaError, Result};
use crate::llm::LlmClient;
use crate::memory::{FileMemoryStore, MemoryManager, MemoryQuery, MemoryStats};
use crate::metrics::METRICS;
use crate::models::{EmotionalContext, ErrorRecord, Memory, MemoryType, Severity};
use crate::obs;
use crate::personality::{PersonalityEngine, PersonalitySummary, PersonalitySystem};
use crate::time::{interval_secs, lenient_option, now};

pub const EMOTIONAL_STATE_FILE: &str = "emotional_state.json";
pub const PERSONALITY_STATE_FILE: &str = "personality.json";

/// Importance of the core memory written on shutdown.
const FINAL_STATE_IMPORTANCE: f64 = 0.9;

/// The five subsystems the orchestrator drives.
#[derive(Clone)]
pub struct Subsystems {
    pub memory: Arc<dyn MemoryManager>,
    pub emotions: Arc<dyn EmotionalEngine>,
    pub personality: Arc<dyn PersonalityEngine>,
    pub awareness: Arc<dyn SelfAwareness>,
    pub consolidation: Arc<dyn MemoryConsolidation>,
}

impl Subsystems {
    /// File-backed subsystems rooted at the configured data directory.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let data_dir = settings.data_dir();
        let memory: Arc<dyn MemoryManager> = Arc::new(FileMemoryStore::from_settings(settings)?);
        let emotions = EmotionalSystem::new(settings.emotional.clone())?
            .with_state_file(data_dir.join(EMOTIONAL_STATE_FILE));
        let intervals = &settings.orchestrator;
        let personality_every = interval_secs(intervals.personality_interval_secs);
        let personality = PersonalitySystem::new(memory.clone(), personality_every)
            .with_state_file(data_dir.join(PERSONALITY_STATE_FILE));
        let reflection_every = interval_secs(intervals.reflection_interval_secs);
        let awareness = SelfAwarenessSystem::new(memory.clone(), reflection_every);
        let consolidation = ConsolidationSystem::new(
            memory.clone(),
            interval_secs(intervals.consolidation_interval_secs),
            settings.memory.max_memory_age,
        );
        Ok(Self {
            memory,
            emotions: Arc::new(emotions),
            personality: Arc::new(personality),
            awareness: Arc::new(awareness),
            consolidation: Arc::new(consolidation),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsystemHealth {
    pub status: HealthStatus,
    pub message: String,
}

impl SubsystemHealth {
    fn from_result<T>(result: Result<T>, describe: impl FnOnce(T) -> String) -> Self {
        match result {
            Ok(value) => Self {
                status: HealthStatus::Healthy,
                message: describe(value),
            },
            Err(e) => Self {
                status: HealthStatus::Degraded,
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Degraded when any subsystem is.
    pub status: HealthStatus,
    pub subsystems: BTreeMap<String, SubsystemHealth>,
    #[serde(with = "crate::time::lenient")]
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AwarenessStatus {
    #[serde(with = "lenient_option")]
    pub last_reflection: Option<DateTime<Utc>>,
    #[serde(with = "lenient_option")]
    pub last_consolidation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub is_running: bool,
    #[serde(with = "lenient_option")]
    pub last_health_check: Option<DateTime<Utc>>,
    #[serde(with = "lenient_option")]
    pub started_at: Option<DateTime<Utc>>,
    pub memory_system: MemoryStats,
    pub emotional_system: EmotionalContext,
    pub personality_system: PersonalitySummary,
    pub self_awareness: AwarenessStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Consolidation,
    Reflection,
    Personality,
    HealthCheck,
}

impl Job {
    const ALL: [Job; 4] = [
        Job::Consolidation,
        Job::Reflection,
        Job::Personality,
        Job::HealthCheck,
    ];

    fn name(self) -> &'static str {
        match self {
            Job::Consolidation => "consolidation",
            Job::Reflection => "reflection",
            Job::Personality => "personality",
            Job::HealthCheck => "health_check",
        }
    }

    fn period_secs(self, config: &OrchestratorConfig) -> u64 {
        match self {
            Job::Consolidation => config.consolidation_interval_secs,
            Job::Reflection => config.reflection_interval_secs,
            Job::Personality => config.personality_interval_secs,
            Job::HealthCheck => config.health_check_interval_secs,
        }
    }
}

/// State shared with the background tasks.
struct Shared {
    subsystems: Subsystems,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
}

impl Shared {
    async fn run(&self, job: Job) -> Result<()> {
        let s = &self.subsystems;
        match job {
            Job::Consolidation => s.consolidation.consolidate_memories(false).await.map(drop),
            Job::Reflection => s.awareness.reflect(false).await.map(drop),
            Job::Personality => s.personality.update_personality(false).await.map(drop),
            Job::HealthCheck => {
                let report = self.check_health().await;
                if !report.is_healthy() {
                    tracing::warn!(report = ?report.subsystems, "system health degraded");
                }
                Ok(())
            }
        }
    }

    async fn task_failed(&self, job: Job, error: &AvaError) {
        METRICS.inc_task_failures();
        obs::emit_task_failed(job.name(), error);
        let record = ErrorRecord::new(
            format!("orchestrator.{}", job.name()),
            Severity::Error,
            error.to_string(),
        );
        if let Err(e) = self.subsystems.memory.record_error(record).await {
            tracing::warn!(task = job.name(), error = %e, "could not record task failure");
        }
    }

    async fn check_health(&self) -> HealthReport {
        let s = &self.subsystems;
        let mut subsystems = BTreeMap::new();

        let memories = s.memory.get_memories(&MemoryQuery::all()).await;
        subsystems.insert(
            "memory".to_string(),
            SubsystemHealth::from_result(memories, |m| format!("{} memories", m.len())),
        );
        let emotion = s.emotions.get_current_state().await;
        subsystems.insert(
            "emotional".to_string(),
            SubsystemHealth::from_result(emotion, |e| {
                format!("{} (intensity {:.2})", e.primary, e.intensity)
            }),
        );
        let personality = s.personality.get_personality_summary().await;
        subsystems.insert(
            "personality".to_string(),
            SubsystemHealth::from_result(personality, |p| {
                let (stage, interactions) = (p.development_stage, p.interactions);
                format!("{stage} stage, {interactions} interactions")
            }),
        );

        let status = if subsystems.values().all(|h| h.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        let checked_at = now();
        *self.last_health_check.write().await = Some(checked_at);
        tracing::debug!(?status, "health check complete");
        HealthReport {
            status,
            subsystems,
            checked_at,
        }
    }
}

#[derive(Default)]
struct Runtime {
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
    started_at: Option<DateTime<Utc>>,
}

pub struct Orchestrator {
    shared: Arc<Shared>,
    config: OrchestratorConfig,
    runtime: Mutex<Runtime>,
}

impl Orchestrator {
    pub fn new(subsystems: Subsystems, config: OrchestratorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                subsystems,
                last_health_check: RwLock::new(None),
            }),
            config,
            runtime: Mutex::new(Runtime::default()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let subsystems = Subsystems::from_settings(settings)?;
        Ok(Self::new(subsystems, settings.orchestrator.clone()))
    }

    pub fn subsystems(&self) -> &Subsystems {
        &self.shared.subsystems
    }

    pub fn memory(&self) -> Arc<dyn MemoryManager> {
        self.shared.subsystems.memory.clone()
    }

    /// A conversation handler over this orchestrator's subsystems.
    pub fn conversation(&self, llm: Arc<dyn LlmClient>) -> ConversationHandler {
        let s = &self.shared.subsystems;
        ConversationHandler::new(
            s.memory.clone(),
            s.emotions.clone(),
            s.personality.clone(),
            llm,
        )
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.cancel.is_some()
    }

    pub async fn task_count(&self) -> usize {
        self.runtime.lock().await.tasks.len()
    }

    pub async fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self.shared.last_health_check.read().await
    }

    /// Initialize the subsystems and spawn the periodic tasks. A failed
    /// initialization starts nothing.
    pub async fn start(&self) -> Result<()> {
        // Held until the tasks are registered: concurrent calls start once.
        let mut runtime = self.runtime.lock().await;
        if runtime.cancel.is_some() {
            tracing::debug!("orchestrator already running");
            return Ok(());
        }
        if let Err(e) = self.initialize().await {
            tracing::error!(error = %e, "startup failed, nothing started");
            for task in runtime.tasks.drain(..) {
                task.abort();
            }
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let tasks: Vec<JoinHandle<()>> = Job::ALL
            .into_iter()
            .map(|job| self.spawn(job, cancel.clone()))
            .collect();

        runtime.cancel = Some(cancel);
        runtime.tasks = tasks;
        runtime.started_at = Some(now());
        obs::emit_orchestrator_started(runtime.tasks.len());
        Ok(())
    }

    /// Load persisted state into every subsystem without starting tasks.
    pub async fn initialize(&self) -> Result<()> {
        let s = &self.shared.subsystems;
        s.memory.initialize().await?;
        s.emotions.initialize().await?;
        s.personality.initialize().await?;
        s.awareness.initialize().await?;
        Ok(())
    }

    fn spawn(&self, job: Job, cancel: CancellationToken) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let period = std::time::Duration::from_secs(job.period_secs(&self.config));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = shared.run(job).await {
                            shared.task_failed(job, &e).await;
                        }
                    }
                }
            }
            tracing::debug!(task = job.name(), "task stopped");
        })
    }

    /// Save final state, then stop the periodic tasks. Safe to call when not
    /// running.
    pub async fn shutdown(&self) {
        let mut runtime = self.runtime.lock().await;
        if let Some(cancel) = runtime.cancel.take() {
            self.save_final_state().await;
            cancel.cancel();
            for result in join_all(runtime.tasks.drain(..)).await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "background task ended abnormally");
                }
            }
            METRICS.flush();
            let uptime = runtime
                .started_at
                .take()
                .map(|t| (now() - t).num_seconds())
                .unwrap_or(0);
            obs::emit_orchestrator_stopped(uptime);
        } else {
            for task in runtime.tasks.drain(..) {
                task.abort();
            }
        }
    }

    async fn save_final_state(&self) {
        let s = &self.shared.subsystems;
        match s.emotions.get_current_state().await {
            Ok(state) => {
                let memory = Memory::new(
                    MemoryType::Core,
                    format!(
                        "Final emotional state: {} (intensity {:.2}, valence {:.2})",
                        state.primary, state.intensity, state.valence
                    ),
                )
                .with_importance(FINAL_STATE_IMPORTANCE)
                .with_themes(["shutdown"])
                .with_emotional_context(state)
                .with_metadata("event", json!("shutdown"));
                if let Err(e) = s.memory.add_memory(memory).await {
                    tracing::error!(error = %e, "failed to store final emotional state");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to read final emotional state"),
        }
        if let Err(e) = s.awareness.reflect(true).await {
            tracing::error!(error = %e, "final reflection failed");
        }
        if let Err(e) = s.personality.update_personality(true).await {
            tracing::error!(error = %e, "final personality update failed");
        }
        if let Err(e) = s.consolidation.consolidate_memories(true).await {
            tracing::error!(error = %e, "final consolidation failed");
        }
    }

    /// Probe every subsystem and record the check time.
    pub async fn check_system_health(&self) -> HealthReport {
        self.shared.check_health().await
    }

    pub async fn get_system_status(&self) -> Result<SystemStatus> {
        let s = &self.shared.subsystems;
        let (is_running, started_at) = {
            let runtime = self.runtime.lock().await;
            (runtime.cancel.is_some(), runtime.started_at)
        };
        Ok(SystemStatus {
            is_running,
            last_health_check: self.last_health_check().await,
            started_at,
            memory_system: s.memory.stats().await?,
            emotional_system: s.emotions.get_current_state().await?,
            personality_system: s.personality.get_personality_summary().await?,
            self_awareness: AwarenessStatus {
                last_reflection: s.awareness.last_reflection().await,
                last_consolidation: s.consolidation.last_consolidation().await,
            },
        })
    }
}
