//! Snapshots of the memory directory.
//!
//! Layout: `<backup_dir>/<id>/manifest.json` next to a copy of every memory
//! file under its original relative path (`core/<id>.json`, ...). The manifest
//! records a SHA-256 digest per file; restores verify all digests before the
//! memory directory is touched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::MemoryType;
use crate::storage;
use crate::time::{lenient, now};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup not found: {id}")]
    NotFound { id: String },

    #[error("backup {id} is corrupt: digest mismatch for {path}")]
    DigestMismatch { id: String, path: String },

    #[error("backup {id} has an invalid manifest: {reason}")]
    InvalidManifest { id: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BackupResult<T> = std::result::Result<T, BackupError>;

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub id: String,
    #[serde(with = "lenient")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    pub memory_count: usize,
    /// Relative path (forward slashes) to hex SHA-256.
    pub files: BTreeMap<String, String>,
}

pub struct BackupManager {
    memory_dir: PathBuf,
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(memory_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            memory_dir: memory_dir.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy every memory file into a new backup. Returns the backup id.
    pub fn create_backup(&self, description: &str) -> BackupResult<String> {
        let timestamp = now();
        let id = new_backup_id(timestamp);
        let dest = self.backup_dir.join(&id);
        fs::create_dir_all(&dest)?;

        let mut files = BTreeMap::new();
        for rel in self.memory_files()? {
            let bytes = fs::read(self.memory_dir.join(&rel))?;
            let target = dest.join(&rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &bytes)?;
            files.insert(rel, sha256_hex(&bytes));
        }

        let manifest = BackupManifest {
            id: id.clone(),
            timestamp,
            description: description.to_string(),
            memory_count: files.len(),
            files,
        };
        storage::write_json_atomic(&dest.join(MANIFEST_FILE), &manifest)?;

        tracing::info!(
            backup_id = %id,
            memory_count = manifest.memory_count,
            description = %description,
            "backup created"
        );
        Ok(id)
    }

    /// Manifests of all readable backups, newest first.
    pub fn list_backups(&self) -> BackupResult<Vec<BackupManifest>> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut manifests = Vec::new();
        for entry in entries {
            let path = entry?.path().join(MANIFEST_FILE);
            match storage::read_json_opt::<BackupManifest>(&path) {
                Ok(Some(manifest)) => manifests.push(manifest),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable backup manifest"
                    );
                }
            }
        }
        manifests.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(manifests)
    }

    pub fn last_backup_time(&self) -> BackupResult<Option<DateTime<Utc>>> {
        Ok(self.list_backups()?.first().map(|m| m.timestamp))
    }

    /// Replace the memories on disk with the contents of backup `id`.
    ///
    /// The error log is left alone. The memory store must be re-initialized
    /// afterwards to pick up the restored files.
    pub fn restore_from_backup(&self, id: &str) -> BackupResult<BackupManifest> {
        let not_found = || BackupError::NotFound { id: id.to_string() };
        if !is_plain_name(id) {
            return Err(not_found());
        }
        let src = self.backup_dir.join(id);
        let manifest: BackupManifest = match storage::read_json_opt(&src.join(MANIFEST_FILE)) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return Err(not_found()),
            Err(e) => {
                return Err(BackupError::InvalidManifest {
                    id: id.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        // Verify everything up front so a bad backup never half-applies.
        let mut contents = Vec::with_capacity(manifest.files.len());
        for (rel, expected) in &manifest.files {
            if !is_safe_relative(rel) {
                return Err(BackupError::InvalidManifest {
                    id: id.to_string(),
                    reason: format!("unsafe path {rel}"),
                });
            }
            let mismatch = || BackupError::DigestMismatch {
                id: id.to_string(),
                path: rel.clone(),
            };
            let bytes = fs::read(src.join(rel)).map_err(|_| mismatch())?;
            if !sha256_hex(&bytes).eq_ignore_ascii_case(expected) {
                return Err(mismatch());
            }
            contents.push((rel, bytes));
        }

        for memory_type in MemoryType::ALL {
            let dir = self.memory_dir.join(memory_type.as_str());
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        for (rel, bytes) in contents {
            let target = self.memory_dir.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, bytes)?;
        }

        tracing::info!(backup_id = %id, memory_count = manifest.memory_count, "backup restored");
        Ok(manifest)
    }

    /// Relative paths of all memory files, sorted.
    fn memory_files(&self) -> BackupResult<Vec<String>> {
        let mut out = Vec::new();
        for memory_type in MemoryType::ALL {
            let dir = self.memory_dir.join(memory_type.as_str());
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if entry.file_type()?.is_file() && name.ends_with(".json") {
                    out.push(format!("{}/{}", memory_type.as_str(), name));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

fn new_backup_id(at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("backup-{}-{}", at.format("%Y%m%dT%H%M%S"), &suffix[..8])
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

fn is_safe_relative(rel: &str) -> bool {
    let path = Path::new(rel);
    !rel.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}
