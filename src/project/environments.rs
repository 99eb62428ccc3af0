//! Environment registry
//!
//! Environments are not stored objects. A project's environment list comes
//! from, in order of precedence:
//! 1. the sync peer, when it answers with a list (taken verbatim, no merge)
//! 2. local evidence records (`usedBy = <name>` in the settings collection)
//! 3. the synthetic default `live`, never persisted
//!
//! Deleting an environment is backup-gated: nothing is dropped unless the
//! backup completed first.

use crate::error::{require, Error, Result};
use crate::project::backup::{BackupManager, BackupRef};
use crate::project::settings::SETTINGS_COLLECTION;
use crate::project::types::{dedup_in_order, DEFAULT_ENVIRONMENT, PROJECT_SENTINEL};
use crate::resource::cache::ResourceCache;
use crate::storage::namespace::validate_environment_name;
use crate::storage::{CollectionKey, StorageEngine, UpdateOptions};
use crate::sync::SyncClient;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Remote resource name for the environment list
const ENVIRONMENTS_RESOURCE: &str = "environments";

/// Per-collection outcome of an environment deletion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropReport {
    pub dropped: Vec<String>,
    pub failed: Vec<DropFailure>,
    /// Not attempted because the deletion was cancelled
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropFailure {
    pub collection: String,
    pub reason: String,
}

impl DropReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Successful environment deletion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentDeletion {
    pub backup: BackupRef,
    pub report: DropReport,
}

/// Cooperative cancellation for destructive batches
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Derives and mutates the environment list of a project
pub struct EnvironmentRegistry {
    store: Arc<dyn StorageEngine>,
    backups: Arc<dyn BackupManager>,
    sync: Arc<SyncClient>,
    cache: Arc<ResourceCache>,
}

impl EnvironmentRegistry {
    pub fn new(
        store: Arc<dyn StorageEngine>,
        backups: Arc<dyn BackupManager>,
        sync: Arc<SyncClient>,
        cache: Arc<ResourceCache>,
    ) -> Self {
        Self {
            store,
            backups,
            sync,
            cache,
        }
    }

    /// Authoritative environment list of a project
    pub async fn list_environments(&self, project: &str) -> Result<Vec<String>> {
        require("project", project)?;

        match self.sync.get_resource(project, None, ENVIRONMENTS_RESOURCE).await {
            Some(Value::Array(items)) => {
                let names: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                match names {
                    Some(names) => {
                        tracing::debug!("🌍 Using remote environments for '{}': {:?}", project, names);
                        return Ok(names);
                    }
                    None => tracing::warn!(
                        "⚠️ Remote environment list for '{}' is not a list of names, using local state",
                        project
                    ),
                }
            }
            Some(other) => tracing::warn!(
                "⚠️ Remote environment list for '{}' is not an array ({}), using local state",
                project,
                other
            ),
            None => {}
        }

        self.local_environments(project).await
    }

    async fn local_environments(&self, project: &str) -> Result<Vec<String>> {
        let evidence = self.store.find(project, SETTINGS_COLLECTION, &json!({})).await?;

        let mut names: Vec<String> = evidence
            .iter()
            .filter_map(|record| record.get("usedBy").and_then(Value::as_str))
            .filter(|name| !name.is_empty() && *name != PROJECT_SENTINEL)
            .map(str::to_string)
            .collect();
        dedup_in_order(&mut names);

        if names.is_empty() {
            names.push(DEFAULT_ENVIRONMENT.to_string());
        }
        Ok(names)
    }

    pub async fn environment_exists(&self, project: &str, name: &str) -> Result<bool> {
        Ok(self.list_environments(project).await?.iter().any(|env| env == name))
    }

    /// Record an environment; repeated calls leave a single evidence record
    pub async fn add_environment(&self, project: &str, name: &str) -> Result<String> {
        require("project", project)?;
        validate_name(name)?;
        if !self.store.database_exists(project).await? {
            return Err(Error::not_found("project", project));
        }

        tracing::info!("➕ Adding environment '{}' to project '{}'", name, project);
        self.store
            .update_one(
                project,
                SETTINGS_COLLECTION,
                &json!({ "usedBy": name }),
                &json!({}),
                UpdateOptions::upsert(),
            )
            .await?;

        Ok(name.to_string())
    }

    /// Back up the project, drop the environment's collections, remove its evidence
    pub async fn delete_environment(&self, project: &str, name: &str) -> Result<EnvironmentDeletion> {
        self.delete_environment_with(project, name, &CancelToken::new()).await
    }

    /// [`Self::delete_environment`] with cooperative cancellation between drops
    pub async fn delete_environment_with(
        &self,
        project: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<EnvironmentDeletion> {
        require("project", project)?;
        validate_name(name)?;
        if !self.store.database_exists(project).await? {
            return Err(Error::not_found("project", project));
        }

        tracing::info!("🗑️ Deleting environment '{}' from project '{}'", name, project);

        let backup = self.backups.create_backup(project).await.map_err(|e| {
            tracing::error!(
                "❌ Backup of '{}' failed, environment '{}' left untouched: {}",
                project,
                name,
                e
            );
            e
        })?;

        let targets: Vec<String> = self
            .store
            .list_collections(project)
            .await?
            .into_iter()
            .filter(|collection| CollectionKey::parse(collection).belongs_to(name))
            .collect();

        let mut report = DropReport::default();
        for collection in targets {
            if cancel.is_cancelled() {
                report.skipped.push(collection);
                continue;
            }
            match self.store.drop_collection(project, &collection).await {
                Ok(_) => report.dropped.push(collection),
                Err(e) => {
                    tracing::warn!("⚠️ Failed to drop collection '{}' of '{}': {}", collection, project, e);
                    report.failed.push(DropFailure {
                        collection,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.cache.invalidate_environment(project, name);

        if !report.is_complete() {
            tracing::error!(
                "❌ Environment '{}' of '{}' only partially deleted (backup at {}): {} dropped, {} failed, {} skipped",
                name,
                project,
                backup.location,
                report.dropped.len(),
                report.failed.len(),
                report.skipped.len()
            );
            return Err(Error::PartialDeletion {
                project: project.to_string(),
                environment: name.to_string(),
                report,
            });
        }

        if let Err(e) = self
            .store
            .remove(project, SETTINGS_COLLECTION, &json!({ "usedBy": name }))
            .await
        {
            tracing::error!(
                "❌ Dropped {} collections of '{}' in '{}' but kept its evidence record: {}",
                report.dropped.len(),
                name,
                project,
                e
            );
            report.failed.push(DropFailure {
                collection: SETTINGS_COLLECTION.to_string(),
                reason: format!("evidence record not removed: {e}"),
            });
            return Err(Error::PartialDeletion {
                project: project.to_string(),
                environment: name.to_string(),
                report,
            });
        }

        tracing::info!(
            "✅ Deleted environment '{}' from project '{}' ({} collections dropped)",
            name,
            project,
            report.dropped.len()
        );

        Ok(EnvironmentDeletion { backup, report })
    }
}

fn validate_name(name: &str) -> Result<()> {
    validate_environment_name(name)?;
    if name == PROJECT_SENTINEL {
        return Err(Error::validation(
            "environment",
            format!("'{PROJECT_SENTINEL}' is reserved"),
        ));
    }
    Ok(())
}
