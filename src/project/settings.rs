//! Access to the project-wide settings document

use crate::error::Result;
use crate::project::types::{StoredSettings, SyncSettings, PROJECT_SENTINEL};
use crate::storage::{StorageEngine, UpdateOptions};
use serde_json::json;

/// Unscoped collection holding project settings and environment evidence
pub const SETTINGS_COLLECTION: &str = "settings";

pub async fn load_settings(store: &dyn StorageEngine, project: &str) -> Result<Option<StoredSettings>> {
    let found = store
        .find(project, SETTINGS_COLLECTION, &json!({ "usedBy": PROJECT_SENTINEL }))
        .await?;
    match found.into_iter().next() {
        Some(document) => Ok(Some(serde_json::from_value(document)?)),
        None => Ok(None),
    }
}

pub async fn save_settings(store: &dyn StorageEngine, project: &str, settings: &StoredSettings) -> Result<()> {
    store
        .replace_one(
            project,
            SETTINGS_COLLECTION,
            &json!({ "usedBy": PROJECT_SENTINEL }),
            &serde_json::to_value(settings)?,
            UpdateOptions::upsert(),
        )
        .await?;
    Ok(())
}

/// Sync settings of a project, `None` when the project has none stored
pub async fn load_sync_settings(store: &dyn StorageEngine, project: &str) -> Result<Option<SyncSettings>> {
    Ok(load_settings(store, project).await?.and_then(|settings| settings.sync))
}
