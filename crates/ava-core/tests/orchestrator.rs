//! Orchestrator lifecycle: startup, periodic tasks, shutdown ordering and
//! failure handling.

use std::sync::Arc;
use std::time::Duration;

use ava_core::config::OrchestratorConfig;
use ava_core::fakes::{
    CallLog, FailingMemoryManager, InMemoryMemoryManager, RecordingAwareness,
    RecordingConsolidation, RecordingPersonality,
};
use ava_core::{EmotionalSystem, MemoryManager, MemoryQuery, MemoryType, Orchestrator, Subsystems};

fn subsystems(log: &CallLog, memory: Arc<dyn MemoryManager>) -> Subsystems {
    Subsystems {
        memory,
        emotions: Arc::new(EmotionalSystem::new(Default::default()).unwrap()),
        personality: Arc::new(RecordingPersonality::new(log.clone())),
        awareness: Arc::new(RecordingAwareness::new(log.clone())),
        consolidation: Arc::new(RecordingConsolidation::new(log.clone())),
    }
}

fn orchestrator(log: &CallLog) -> (Orchestrator, Arc<InMemoryMemoryManager>) {
    let memory = Arc::new(InMemoryMemoryManager::with_log(log.clone()));
    let orch = Orchestrator::new(
        subsystems(log, memory.clone()),
        OrchestratorConfig::default(),
    );
    (orch, memory)
}

#[tokio::test(start_paused = true)]
async fn test_start_spawns_four_tasks_and_shutdown_stops_them() {
    let log = CallLog::new();
    let (orch, _memory) = orchestrator(&log);

    orch.start().await.unwrap();
    assert!(orch.is_running().await);
    assert_eq!(orch.task_count().await, 4);

    orch.shutdown().await;
    assert!(!orch.is_running().await);
    assert_eq!(orch.task_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_noop() {
    let log = CallLog::new();
    let (orch, _memory) = orchestrator(&log);

    orch.start().await.unwrap();
    orch.start().await.unwrap();
    assert_eq!(orch.task_count().await, 4);
    assert_eq!(log.count("memory.initialize"), 1);

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_spawn_one_task_set() {
    let log = CallLog::new();
    let (orch, _memory) = orchestrator(&log);

    let (first, second) = tokio::join!(orch.start(), orch.start());
    first.unwrap();
    second.unwrap();
    assert_eq!(orch.task_count().await, 4);
    assert_eq!(log.count("memory.initialize"), 1);
    assert_eq!(log.count("personality.initialize"), 1);

    orch.shutdown().await;
    assert!(!orch.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_tasks_tick_immediately() {
    let log = CallLog::new();
    let (orch, _memory) = orchestrator(&log);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(log.count("consolidate_memories(force=false)"), 1);
    assert_eq!(log.count("reflect(force=false)"), 1);
    assert_eq!(log.count("update_personality(force=false)"), 1);
    assert!(orch.last_health_check().await.is_some());

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_tasks_repeat_on_interval() {
    let log = CallLog::new();
    let memory = Arc::new(InMemoryMemoryManager::with_log(log.clone()));
    let config = OrchestratorConfig {
        reflection_interval_secs: 10,
        ..OrchestratorConfig::default()
    };
    let orch = Orchestrator::new(subsystems(&log, memory), config);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(log.count("reflect(force=false)"), 3);

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_saves_final_state_in_order() {
    let log = CallLog::new();
    let (orch, memory) = orchestrator(&log);

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    orch.shutdown().await;

    let core = log
        .position("add_memory(core)")
        .expect("final state stored");
    let reflect = log
        .position("reflect(force=true)")
        .expect("final reflection");
    let personality = log
        .position("update_personality(force=true)")
        .expect("final personality update");
    let consolidate = log
        .position("consolidate_memories(force=true)")
        .expect("final consolidation");
    assert!(core < reflect);
    assert!(reflect < personality);
    assert!(personality < consolidate);
    assert_eq!(log.count("add_memory(core)"), 1);

    let stored = memory
        .get_memories(&MemoryQuery::all().with_type(MemoryType::Core))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].content.starts_with("Final emotional state"));
    assert!(stored[0].has_theme("shutdown"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_when_idle_saves_nothing() {
    let log = CallLog::new();
    let (orch, _memory) = orchestrator(&log);

    orch.shutdown().await;
    assert!(log.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_task_error_is_recorded_and_system_keeps_running() {
    let log = CallLog::new();
    let memory = Arc::new(InMemoryMemoryManager::with_log(log.clone()));
    let mut parts = subsystems(&log, memory.clone());
    parts.consolidation = Arc::new(RecordingConsolidation::failing(log.clone(), "Test error"));
    let orch = Orchestrator::new(parts, OrchestratorConfig::default());

    orch.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(orch.is_running().await);

    let errors = memory.get_recent_errors(10).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].source, "orchestrator.consolidation");
    assert!(errors[0].message.contains("Test error"));

    // Final consolidation fails too; shutdown still completes.
    orch.shutdown().await;
    assert!(!orch.is_running().await);
    assert_eq!(log.count("consolidate_memories(force=true)"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_startup_failure_leaves_nothing_running() {
    let log = CallLog::new();
    let memory = Arc::new(FailingMemoryManager::new("Initialization failed"));
    let orch = Orchestrator::new(subsystems(&log, memory), OrchestratorConfig::default());

    let err = orch.start().await.unwrap_err();
    assert!(err.to_string().contains("Initialization failed"));
    assert!(!orch.is_running().await);
    assert_eq!(orch.task_count().await, 0);
    assert_eq!(log.count("personality.initialize"), 0);
}

#[tokio::test]
async fn test_health_report_degrades_with_failing_memory() {
    let log = CallLog::new();
    let memory = Arc::new(FailingMemoryManager::new("disk unavailable"));
    let orch = Orchestrator::new(subsystems(&log, memory), OrchestratorConfig::default());

    let report = orch.check_system_health().await;
    assert!(!report.is_healthy());
    let memory_health = &report.subsystems["memory"];
    assert!(memory_health.message.contains("disk unavailable"));
    assert_eq!(
        serde_json::to_value(&report.subsystems["emotional"]).unwrap()["status"],
        "healthy"
    );
}

#[tokio::test]
async fn test_status_reports_running_flag() {
    let log = CallLog::new();
    let (orch, _memory) = orchestrator(&log);

    orch.start().await.unwrap();
    let status = orch.get_system_status().await.unwrap();
    assert!(status.is_running);
    assert!(status.started_at.is_some());
    orch.shutdown().await;

    let status = orch.get_system_status().await.unwrap();
    assert!(!status.is_running);
    assert!(status.self_awareness.last_reflection.is_some());
}
