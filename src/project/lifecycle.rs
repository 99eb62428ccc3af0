//! Project lifecycle: creation, deletion and the composite project read model
//!
//! Ordering invariant: when a backup is requested it completes before the
//! project database is dropped, never the other way round.

use crate::error::{require, Error, Result};
use crate::project::backup::{BackupManager, BackupRef};
use crate::project::environments::EnvironmentRegistry;
use crate::project::settings::{load_settings, save_settings};
use crate::project::types::{
    derive_project_id, Project, SettingsUpdate, StoredSettings, RESERVED_DATABASES,
};
use crate::project::users::{require_admin, User, UserDirectory};
use crate::resource::cache::ResourceCache;
use crate::storage::StorageEngine;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of [`ProjectLifecycle::delete_project`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDeletion {
    pub id: String,
    /// `None` when the caller opted out of the backup
    pub backup: Option<BackupRef>,
}

/// Orchestrates project creation, deletion and reads
pub struct ProjectLifecycle {
    store: Arc<dyn StorageEngine>,
    backups: Arc<dyn BackupManager>,
    users: Arc<dyn UserDirectory>,
    environments: Arc<EnvironmentRegistry>,
    cache: Arc<ResourceCache>,
}

impl ProjectLifecycle {
    pub fn new(
        store: Arc<dyn StorageEngine>,
        backups: Arc<dyn BackupManager>,
        users: Arc<dyn UserDirectory>,
        environments: Arc<EnvironmentRegistry>,
        cache: Arc<ResourceCache>,
    ) -> Self {
        Self {
            store,
            backups,
            users,
            environments,
            cache,
        }
    }

    pub fn environments(&self) -> &EnvironmentRegistry {
        &self.environments
    }

    /// Resolve a user and require administrator rights
    pub async fn authorize_admin(&self, user_id: &str) -> Result<User> {
        require_admin(self.users.as_ref(), user_id).await
    }

    /// Ids of all projects
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_databases()
            .await?
            .into_iter()
            .filter(|name| !RESERVED_DATABASES.contains(&name.as_str()))
            .collect())
    }

    pub async fn project_exists(&self, id: &str) -> Result<bool> {
        require("id", id)?;
        if RESERVED_DATABASES.contains(&id) {
            return Ok(false);
        }
        self.store.database_exists(id).await
    }

    async fn require_project(&self, id: &str) -> Result<()> {
        if !self.project_exists(id).await? {
            return Err(Error::not_found("project", id));
        }
        Ok(())
    }

    /// Create a project named `name` on behalf of an administrator
    pub async fn create_project(&self, name: &str, requesting_user_id: &str) -> Result<Project> {
        let user = self.authorize_admin(requesting_user_id).await?;
        require("name", name)?;
        let id = derive_project_id(name)?;

        if self.store.database_exists(&id).await? {
            return Err(Error::Conflict(format!(
                "a project by name '{name}' already exists"
            )));
        }

        tracing::info!("🏗️ Creating project '{}' ({}) for '{}'", id, name, user.username);

        self.store.create_database(&id).await.map_err(|e| match e {
            Error::Conflict(_) => Error::Conflict(format!("a project by name '{name}' already exists")),
            other => other,
        })?;
        if let Err(e) = save_settings(self.store.as_ref(), &id, &StoredSettings::baseline(name)).await {
            tracing::error!("❌ Could not write settings of new project '{}', removing it: {}", id, e);
            if let Err(cleanup) = self.store.drop_database(&id).await {
                tracing::error!("❌ Failed to remove half-created project '{}': {}", id, cleanup);
            }
            return Err(e);
        }

        self.get_project(&id).await
    }

    /// Drop a project, taking a backup first unless `make_backup` is false
    ///
    /// Without a backup the drop is immediate and irreversible.
    pub async fn delete_project(&self, id: &str, make_backup: bool) -> Result<ProjectDeletion> {
        self.require_project(id).await?;

        let backup = if make_backup {
            let backup = self.backups.create_backup(id).await.map_err(|e| {
                tracing::error!("❌ Backup of '{}' failed, project left untouched: {}", id, e);
                e
            })?;
            Some(backup)
        } else {
            tracing::warn!("⚠️ Dropping project '{}' without a backup", id);
            None
        };

        self.store.drop_database(id).await?;
        self.cache.invalidate_project(id);

        tracing::info!("🗑️ Deleted project '{}'", id);
        Ok(ProjectDeletion {
            id: id.to_string(),
            backup,
        })
    }

    /// Composite read model with defaults applied
    pub async fn get_project(&self, id: &str) -> Result<Project> {
        self.require_project(id).await?;

        let stored = load_settings(self.store.as_ref(), id).await?.unwrap_or_default();
        let users = self.users.get_users_for_project(id).await?;
        let backups = self.backups.get_backups_for_project(id).await?;
        let environments = self.environments.list_environments(id).await?;

        Ok(Project {
            id: id.to_string(),
            settings: stored.materialize(id),
            environments,
            users,
            backups,
        })
    }

    /// Partially update project settings; administrators only
    pub async fn update_settings(
        &self,
        id: &str,
        update: SettingsUpdate,
        requesting_user_id: &str,
    ) -> Result<Project> {
        self.authorize_admin(requesting_user_id).await?;
        self.require_project(id).await?;

        let mut stored = load_settings(self.store.as_ref(), id)
            .await?
            .unwrap_or_else(|| StoredSettings::baseline(id));
        update.apply(&mut stored);
        save_settings(self.store.as_ref(), id, &stored).await?;

        tracing::info!("⚙️ Updated settings of project '{}'", id);
        self.get_project(id).await
    }

    pub async fn create_backup(&self, id: &str) -> Result<BackupRef> {
        self.require_project(id).await?;
        self.backups.create_backup(id).await
    }

    pub async fn list_backups(&self, id: &str) -> Result<Vec<BackupRef>> {
        require("id", id)?;
        self.backups.get_backups_for_project(id).await
    }
}
