//! Point-in-time project backups
//!
//! Backups are append-only: a backup is written once, never modified, and
//! retention is left to whoever owns the backup directory. They live outside
//! the project data directory so dropping a project keeps its backups.

use crate::error::{Error, Result};
use crate::storage::{SqliteDocumentStore, StorageEngine};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

/// Opaque handle to a created backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRef {
    pub project: String,
    pub created_at: DateTime<Utc>,
    pub location: String,
}

/// Creates and lists project snapshots
#[async_trait]
pub trait BackupManager: Send + Sync {
    /// Snapshot the whole project database. Must not return before the
    /// snapshot is durable.
    async fn create_backup(&self, project: &str) -> Result<BackupRef>;

    /// Backups of a project, oldest first
    async fn get_backups_for_project(&self, project: &str) -> Result<Vec<BackupRef>>;
}

/// Backups written with SQLite `VACUUM INTO`
///
/// Layout: {backup_dir}/{project}/{created_at_millis}-{suffix}.db
#[derive(Debug)]
pub struct SqliteBackupManager {
    store: Arc<SqliteDocumentStore>,
    backup_dir: PathBuf,
}

impl SqliteBackupManager {
    pub fn new(store: Arc<SqliteDocumentStore>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            backup_dir: backup_dir.into(),
        }
    }
}

#[async_trait]
impl BackupManager for SqliteBackupManager {
    async fn create_backup(&self, project: &str) -> Result<BackupRef> {
        if !self.store.database_exists(project).await? {
            return Err(Error::not_found("project", project));
        }

        let dir = self.backup_dir.join(project);
        tokio::fs::create_dir_all(&dir).await?;

        let created_at = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let path = dir.join(format!("{}-{}.db", created_at.timestamp_millis(), &suffix[..8]));

        tracing::info!("💾 Creating backup of project '{}': {}", project, path.display());
        self.store.snapshot_into(project, &path).await?;

        Ok(BackupRef {
            project: project.to_string(),
            created_at: parse_backup_time(&path).unwrap_or(created_at),
            location: path.to_string_lossy().into_owned(),
        })
    }

    async fn get_backups_for_project(&self, project: &str) -> Result<Vec<BackupRef>> {
        let dir = self.backup_dir.join(project);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(created_at) = parse_backup_time(&path) else {
                tracing::debug!("Skipping unrecognised file in backup directory: {}", path.display());
                continue;
            };
            backups.push(BackupRef {
                project: project.to_string(),
                created_at,
                location: path.to_string_lossy().into_owned(),
            });
        }
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.location.cmp(&b.location)));
        Ok(backups)
    }
}

fn parse_backup_time(path: &std::path::Path) -> Option<DateTime<Utc>> {
    if path.extension()? != "db" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let millis: i64 = stem.split('-').next()?.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn backup_time_is_read_from_file_name() {
        let parsed = parse_backup_time(Path::new("/b/acme/1700000000000-abcd1234.db")).unwrap();
        assert_eq!(parsed.timestamp_millis(), 1_700_000_000_000);
        assert!(parse_backup_time(Path::new("/b/acme/notes.txt")).is_none());
        assert!(parse_backup_time(Path::new("/b/acme/latest.db")).is_none());
    }
}
