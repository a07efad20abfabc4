//! Operator endpoints: statistics, backups, memory edits and the error log.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ava_core::time::{lenient, lenient_option, now};
use ava_core::{
    BackupManager, BackupManifest, ErrorRecord, HealthReport, Memory, MemoryPatch, MemoryQuery,
    MemoryStats, MemoryType,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Entries in each access ranking.
pub const ACCESS_TOP_N: usize = 10;
pub const DEFAULT_ERROR_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub memory_stats: MemoryStats,
    pub health_status: HealthReport,
    #[serde(with = "lenient")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BackupRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub backup_id: String,
}

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub status: &'static str,
    pub backup_id: String,
}

#[derive(Debug, Serialize)]
pub struct BackupListResponse {
    pub backups: Vec<BackupManifest>,
}

#[derive(Debug, Deserialize)]
pub struct MemoryEditRequest {
    pub memory_id: String,
    #[serde(flatten)]
    pub patch: MemoryPatch,
}

#[derive(Debug, Serialize)]
pub struct MemoryEditResponse {
    pub status: &'static str,
    pub memory_id: String,
    pub backup_id: String,
}

#[derive(Debug, Serialize)]
pub struct AccessEntry {
    pub id: String,
    pub memory_type: MemoryType,
    pub access_count: u64,
    #[serde(with = "lenient_option")]
    pub last_accessed: Option<DateTime<Utc>>,
    pub importance: f64,
}

impl From<&Memory> for AccessEntry {
    fn from(memory: &Memory) -> Self {
        Self {
            id: memory.id.clone(),
            memory_type: memory.memory_type,
            access_count: memory.access_count,
            last_accessed: memory.last_accessed,
            importance: memory.importance,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportanceDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Serialize)]
pub struct AccessStats {
    pub most_accessed: Vec<AccessEntry>,
    pub recent_access: Vec<AccessEntry>,
    pub importance_distribution: ImportanceDistribution,
}

#[derive(Debug, Serialize)]
pub struct AccessStatsResponse {
    pub access_stats: AccessStats,
    #[serde(with = "lenient")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorsResponse {
    pub errors: Vec<ErrorRecord>,
    #[serde(with = "lenient")]
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /admin/stats
async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let memory_stats = state.memory().stats().await?;
    let health_status = state.orchestrator.check_system_health().await;
    Ok(Json(StatsResponse {
        memory_stats,
        health_status,
        timestamp: now(),
    }))
}

/// POST /admin/backup
async fn create_backup(
    State(state): State<AppState>,
    Json(req): Json<BackupRequest>,
) -> ApiResult<Json<BackupResponse>> {
    let backup_id = backup_now(&state.backups, req.description).await?;
    tracing::info!(backup_id = %backup_id, "backup created via admin api");
    Ok(Json(BackupResponse {
        status: "success",
        backup_id,
    }))
}

/// POST /admin/restore
///
/// Replaces the memory directory and reloads the store.
async fn restore_backup(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> ApiResult<Json<BackupResponse>> {
    let backups = state.backups.clone();
    let id = req.backup_id.clone();
    let manifest = blocking(move || backups.restore_from_backup(&id)).await??;
    state.memory().initialize().await?;
    tracing::info!(
        backup_id = %manifest.id,
        memories = manifest.memory_count,
        "backup restored via admin api"
    );
    Ok(Json(BackupResponse {
        status: "success",
        backup_id: manifest.id,
    }))
}

/// GET /admin/backups
async fn list_backups(State(state): State<AppState>) -> ApiResult<Json<BackupListResponse>> {
    let backups = state.backups.clone();
    let backups = blocking(move || backups.list_backups()).await??;
    Ok(Json(BackupListResponse { backups }))
}

/// POST /admin/memory/edit
///
/// Takes a safety backup before the patch is applied.
async fn edit_memory(
    State(state): State<AppState>,
    Json(req): Json<MemoryEditRequest>,
) -> ApiResult<Json<MemoryEditResponse>> {
    if req.patch.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one of content, importance or themes is required".into(),
        ));
    }
    req.patch.validate()?;

    let description = format!("Pre-edit backup for memory {}", req.memory_id);
    let backup_id = backup_now(&state.backups, description).await?;
    let memory = state.memory();
    let updated = memory.update_memory(&req.memory_id, req.patch).await?;
    tracing::info!(
        memory_id = %updated.id,
        backup_id = %backup_id,
        "memory edited via admin api"
    );
    Ok(Json(MemoryEditResponse {
        status: "success",
        memory_id: updated.id,
        backup_id,
    }))
}

/// GET /admin/memory/access-stats
async fn access_stats(State(state): State<AppState>) -> ApiResult<Json<AccessStatsResponse>> {
    let memories = state.memory().get_memories(&MemoryQuery::all()).await?;
    Ok(Json(AccessStatsResponse {
        access_stats: compute_access_stats(&memories),
        timestamp: now(),
    }))
}

/// GET /admin/errors
async fn recent_errors(
    State(state): State<AppState>,
    Query(query): Query<ErrorsQuery>,
) -> ApiResult<Json<ErrorsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_ERROR_LIMIT);
    let errors = state.memory().get_recent_errors(limit).await?;
    Ok(Json(ErrorsResponse {
        errors,
        timestamp: now(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run blocking filesystem work off the async workers.
async fn blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("background task failed: {e}")))
}

async fn backup_now(backups: &Arc<BackupManager>, description: String) -> ApiResult<String> {
    let backups = backups.clone();
    Ok(blocking(move || backups.create_backup(&description)).await??)
}

pub fn compute_access_stats(memories: &[Memory]) -> AccessStats {
    let mut by_count: Vec<&Memory> = memories.iter().collect();
    by_count.sort_by(|a, b| {
        b.access_count
            .cmp(&a.access_count)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut by_recency: Vec<&Memory> = memories
        .iter()
        .filter(|m| m.last_accessed.is_some())
        .collect();
    by_recency.sort_by(|a, b| {
        b.last_accessed
            .cmp(&a.last_accessed)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut distribution = ImportanceDistribution::default();
    for memory in memories {
        match memory.importance {
            i if i < 0.3 => distribution.low += 1,
            i if i < 0.7 => distribution.medium += 1,
            _ => distribution.high += 1,
        }
    }

    AccessStats {
        most_accessed: top_entries(by_count),
        recent_access: top_entries(by_recency),
        importance_distribution: distribution,
    }
}

fn top_entries(ranked: Vec<&Memory>) -> Vec<AccessEntry> {
    ranked
        .into_iter()
        .take(ACCESS_TOP_N)
        .map(Into::into)
        .collect()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/backup", post(create_backup))
        .route("/restore", post(restore_backup))
        .route("/backups", get(list_backups))
        .route("/memory/edit", post(edit_memory))
        .route("/memory/access-stats", get(access_stats))
        .route("/errors", get(recent_errors))
}
