use std::sync::Arc;

use ava_core::{BackupManager, MemoryManager, Orchestrator, Settings};

/// Shared state for every admin handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub backups: Arc<BackupManager>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, backups: BackupManager) -> Self {
        Self {
            orchestrator,
            backups: Arc::new(backups),
        }
    }

    /// State whose backups cover the configured memory directory.
    pub fn from_settings(orchestrator: Arc<Orchestrator>, settings: &Settings) -> Self {
        let backups = BackupManager::new(settings.memory_dir(), settings.backup_dir());
        Self::new(orchestrator, backups)
    }

    pub fn memory(&self) -> Arc<dyn MemoryManager> {
        self.orchestrator.memory()
    }
}
