//! Consolidation, reflection and personality development against a
//! file-backed memory store.

use std::sync::Arc;

use ava_core::config::MemoryConfig;
use ava_core::{
    ConsolidationSystem, EmotionalContext, FileMemoryStore, Memory, MemoryConsolidation,
    MemoryManager, MemoryQuery, MemoryType, PersonalityEngine, PersonalitySystem, SelfAwareness,
    SelfAwarenessSystem, Timestamps,
};
use chrono::{Duration, Utc};
use tempfile::TempDir;

const INTERVAL_HOURS: i64 = 1;

async fn open_store() -> (TempDir, Arc<FileMemoryStore>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memories");
    let store = FileMemoryStore::new(path, MemoryConfig::default()).unwrap();
    store.initialize().await.unwrap();
    (dir, Arc::new(store))
}

fn aged(memory: Memory, age: Duration) -> Memory {
    let mut memory = memory;
    memory.timestamps = Timestamps::at(Utc::now() - age);
    memory
}

fn chat(id: &str, theme: &str, valence: f64) -> Memory {
    Memory::new(MemoryType::Conversation, format!("we talked about {theme}"))
        .with_id(id)
        .with_themes([theme])
        .with_emotional_context(EmotionalContext::new("joy", 0.5, valence, 0.5))
}

async fn ids_of(store: &FileMemoryStore, memory_type: MemoryType) -> Vec<String> {
    let query = MemoryQuery::all().with_type(memory_type);
    let mut ids: Vec<String> = store
        .get_memories(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    ids.sort();
    ids
}

// ---------------------------------------------------------------------------
// Consolidation
// ---------------------------------------------------------------------------

fn consolidation(store: &Arc<FileMemoryStore>) -> ConsolidationSystem {
    ConsolidationSystem::new(store.clone(), Duration::hours(INTERVAL_HOURS), 30)
}

#[tokio::test]
async fn test_consolidation_merges_groups_and_prunes() {
    let (_dir, store) = open_store().await;
    for id in ["h1", "h2", "h3"] {
        let memory = aged(chat(id, "hiking", 0.4), Duration::hours(2));
        store.add_memory(memory).await.unwrap();
    }
    let cooking = aged(chat("c1", "cooking", 0.1), Duration::hours(2));
    store.add_memory(cooking).await.unwrap();
    let stale = Memory::new(MemoryType::Personal, "an old errand").with_id("stale");
    store
        .add_memory(aged(stale, Duration::days(40)))
        .await
        .unwrap();
    let identity = Memory::new(MemoryType::Core, "I am Ava").with_id("identity");
    store
        .add_memory(aged(identity, Duration::days(40)))
        .await
        .unwrap();

    let system = consolidation(&store);
    assert!(system.last_consolidation().await.is_none());
    assert!(system.consolidate_memories(false).await.unwrap());
    assert!(system.last_consolidation().await.is_some());

    assert_eq!(ids_of(&store, MemoryType::Conversation).await, vec!["c1"]);
    assert!(ids_of(&store, MemoryType::Personal).await.is_empty());
    assert_eq!(ids_of(&store, MemoryType::Core).await, vec!["identity"]);

    let query = MemoryQuery::all().with_type(MemoryType::Consolidated);
    let merged = store.get_memories(&query).await.unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].metadata["theme"], "hiking");
    assert!(merged[0].content.starts_with("Consolidated 3 conversations about hiking:"));
}

#[tokio::test]
async fn test_consolidation_waits_for_interval_unless_forced() {
    let (_dir, store) = open_store().await;
    let system = consolidation(&store);

    // Due, but nothing to merge or prune.
    assert!(!system.consolidate_memories(false).await.unwrap());
    let first = system.last_consolidation().await;
    assert!(first.is_some());

    for id in ["a", "b", "c"] {
        let memory = aged(chat(id, "music", 0.2), Duration::hours(2));
        store.add_memory(memory).await.unwrap();
    }
    assert!(!system.consolidate_memories(false).await.unwrap());
    assert_eq!(system.last_consolidation().await, first);
    assert_eq!(ids_of(&store, MemoryType::Conversation).await.len(), 3);

    assert!(system.consolidate_memories(true).await.unwrap());
    assert!(ids_of(&store, MemoryType::Conversation).await.is_empty());
    assert!(system.consolidate_memories(true).await.unwrap());
}

// ---------------------------------------------------------------------------
// Reflection
// ---------------------------------------------------------------------------

fn awareness(store: &Arc<FileMemoryStore>) -> SelfAwarenessSystem {
    SelfAwarenessSystem::new(store.clone(), Duration::hours(INTERVAL_HOURS))
}

async fn reflections(store: &FileMemoryStore) -> Vec<Memory> {
    let query = MemoryQuery::all().with_type(MemoryType::Reflection);
    store.get_memories(&query).await.unwrap()
}

#[tokio::test]
async fn test_reflect_skips_when_nothing_new_unless_forced() {
    let (_dir, store) = open_store().await;
    let system = awareness(&store);

    assert!(!system.reflect(false).await.unwrap());
    assert!(reflections(&store).await.is_empty());
    assert!(system.last_reflection().await.is_none());

    assert!(system.reflect(true).await.unwrap());
    let written = reflections(&store).await;
    assert_eq!(written.len(), 1);
    assert!(written[0].content.starts_with("Reflected on 0 memories"));
}

#[tokio::test]
async fn test_reflect_summarises_recent_memories_once_per_interval() {
    let (_dir, store) = open_store().await;
    store.add_memory(chat("m1", "music", 0.8)).await.unwrap();
    store.add_memory(chat("m2", "music", 0.6)).await.unwrap();
    let system = awareness(&store);

    assert!(system.reflect(false).await.unwrap());
    let written = reflections(&store).await;
    assert_eq!(written.len(), 1);
    assert!(written[0].content.contains("Reflected on 2 memories."));
    assert!(written[0].has_theme("music"));
    assert_eq!(written[0].metadata["dominant_emotion"], "joy");

    assert!(!system.reflect(false).await.unwrap());
    assert!(system.reflect(true).await.unwrap());
    assert_eq!(reflections(&store).await.len(), 2);
}

#[tokio::test]
async fn test_initialize_resumes_from_newest_reflection() {
    let (_dir, store) = open_store().await;
    let older = Memory::new(MemoryType::Reflection, "older").with_id("r-old");
    store
        .add_memory(aged(older, Duration::days(2)))
        .await
        .unwrap();
    let newer = Memory::new(MemoryType::Reflection, "newer").with_id("r-new");
    let newer = aged(newer, Duration::minutes(5));
    let expected = newer.created_at();
    store.add_memory(newer).await.unwrap();
    store.add_memory(chat("m1", "rain", -0.3)).await.unwrap();

    let system = awareness(&store);
    system.initialize().await.unwrap();
    assert_eq!(system.last_reflection().await, Some(expected));
    // The newest reflection is five minutes old, inside the interval.
    assert!(!system.reflect(false).await.unwrap());
}

// ---------------------------------------------------------------------------
// Personality
// ---------------------------------------------------------------------------

fn personality(store: &Arc<FileMemoryStore>, dir: &TempDir) -> PersonalitySystem {
    PersonalitySystem::new(store.clone(), Duration::hours(INTERVAL_HOURS))
        .with_state_file(dir.path().join("personality.json"))
}

#[tokio::test]
async fn test_personality_state_persists_across_restarts() {
    let (dir, store) = open_store().await;
    store.add_memory(chat("m1", "art", 0.9)).await.unwrap();
    store.add_memory(chat("m2", "music", 0.7)).await.unwrap();

    let system = personality(&store, &dir);
    system.initialize().await.unwrap();
    assert!(system.update_personality(false).await.unwrap());
    assert!(!system.update_personality(false).await.unwrap());
    assert!(dir.path().join("personality.json").exists());

    let before = system.get_personality_summary().await.unwrap();
    assert_eq!(before.interactions, 2);
    assert!(before.traits.agreeableness > 0.5);

    let reloaded = personality(&store, &dir);
    reloaded.initialize().await.unwrap();
    let after = reloaded.get_personality_summary().await.unwrap();
    assert_eq!(after.interactions, 2);
    assert_eq!(after.development_stage, before.development_stage);
    assert!(after.last_update.is_some());
    let (a, b) = (after.traits.iter(), before.traits.iter());
    for ((name, value), (_, expected)) in a.into_iter().zip(b) {
        assert!((value - expected).abs() < 1e-9, "{name} drifted");
    }

    // The restored update time keeps the interval gate closed.
    assert!(!reloaded.update_personality(false).await.unwrap());
}

#[tokio::test]
async fn test_personality_ignores_corrupt_state_file() {
    let (dir, store) = open_store().await;
    std::fs::write(dir.path().join("personality.json"), "{").unwrap();

    let system = personality(&store, &dir);
    system.initialize().await.unwrap();
    let summary = system.get_personality_summary().await.unwrap();
    assert_eq!(summary.interactions, 0);
    assert!(summary.last_update.is_none());

    assert!(system.update_personality(true).await.unwrap());
    let raw = std::fs::read_to_string(dir.path().join("personality.json")).unwrap();
    assert!(raw.contains("\"interactions\""));
}
