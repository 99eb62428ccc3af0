//! Project type definitions for the multi-tenant architecture
//!
//! Settings are stored as a single document in the project's `settings`
//! collection, marked `usedBy = "project"`. Defaults are applied when a
//! [`Project`] view is composed, never written back.

use crate::error::{Error, Result};
use crate::project::backup::BackupRef;
use crate::project::users::UserRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `usedBy` marker of the project-wide settings document; never an environment
pub const PROJECT_SENTINEL: &str = "project";

/// Environment presented when a project has no environment evidence at all
pub const DEFAULT_ENVIRONMENT: &str = "live";

/// Language presented when a project has none configured
pub const DEFAULT_LANGUAGE: &str = "en";

/// Names that cannot be project ids: the platform user database, and the
/// `/api/projects` route segment
pub const RESERVED_DATABASES: &[&str] = &["users", "projects"];

/// Composite read model of a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Immutable id derived from the creation name (e.g. "my-site")
    pub id: String,
    /// Settings with defaults materialized
    pub settings: ProjectSettings,
    /// Environment names, remote list when a sync peer answers
    pub environments: Vec<String>,
    pub users: Vec<UserRef>,
    pub backups: Vec<BackupRef>,
}

/// Project settings as presented to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub languages: Vec<String>,
    pub info: ProjectInfo,
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
}

/// Per-project sync peer configuration
///
/// `url` is the peer's API root (e.g. "https://cms.example.com/api/") and
/// `project` the project id on the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SyncSettings {
    /// Peer url and remote project id, only when sync is enabled and complete
    pub fn endpoint(&self) -> Option<(&str, &str)> {
        if !self.enabled {
            return None;
        }
        let url = self.url.as_deref().filter(|u| !u.trim().is_empty())?;
        let project = self.project.as_deref().filter(|p| !p.trim().is_empty())?;
        Some((url, project))
    }
}

/// The settings document exactly as stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    pub used_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ProjectInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncSettings>,
    /// Fields written by other consumers are preserved on rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoredSettings {
    /// Baseline settings persisted for a freshly created project
    pub fn baseline(name: &str) -> Self {
        Self {
            used_by: PROJECT_SENTINEL.to_string(),
            info: Some(ProjectInfo {
                name: name.to_string(),
            }),
            ..Self::default()
        }
    }

    /// Apply read-time defaults
    pub fn materialize(&self, project_id: &str) -> ProjectSettings {
        let languages = match &self.languages {
            Some(languages) if !languages.is_empty() => languages.clone(),
            _ => vec![DEFAULT_LANGUAGE.to_string()],
        };
        ProjectSettings {
            languages,
            info: self.info.clone().unwrap_or_else(|| ProjectInfo {
                name: project_id.to_string(),
            }),
            sync: self.sync.clone().unwrap_or_default(),
        }
    }
}

/// Partial settings change requested by an administrator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub languages: Option<Vec<String>>,
    pub name: Option<String>,
    pub sync: Option<SyncSettings>,
}

impl SettingsUpdate {
    pub fn apply(self, settings: &mut StoredSettings) {
        if let Some(mut languages) = self.languages {
            dedup_in_order(&mut languages);
            settings.languages = Some(languages);
        }
        if let Some(name) = self.name {
            settings.info = Some(ProjectInfo { name });
        }
        if let Some(sync) = self.sync {
            settings.sync = Some(sync);
        }
    }
}

/// Derive a project id from its creation name
///
/// "My Site!" -> "my-site". Fails when nothing usable remains or the id is
/// reserved for the platform.
pub fn derive_project_id(name: &str) -> Result<String> {
    let mut id = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !id.is_empty() {
                id.push('-');
            }
            pending_dash = false;
            id.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if id.is_empty() {
        return Err(Error::validation(
            "name",
            format!("'{name}' does not contain any letters or digits"),
        ));
    }
    if RESERVED_DATABASES.contains(&id.as_str()) {
        return Err(Error::validation("name", format!("'{id}' is reserved")));
    }
    Ok(id)
}

/// Remove duplicates, keeping the first occurrence
pub(crate) fn dedup_in_order(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|value| seen.insert(value.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_lowercase_dash_separated() {
        assert_eq!(derive_project_id("Foo").unwrap(), "foo");
        assert_eq!(derive_project_id("  My  Site! 2 ").unwrap(), "my-site-2");
        assert_eq!(derive_project_id("a__b").unwrap(), "a-b");
    }

    #[test]
    fn unusable_or_reserved_names_are_rejected() {
        assert!(matches!(derive_project_id("!!!"), Err(Error::Validation { .. })));
        assert!(matches!(derive_project_id("Users"), Err(Error::Validation { .. })));
    }

    #[test]
    fn defaults_are_applied_at_read_time() {
        let stored: StoredSettings = serde_json::from_value(json!({"usedBy": "project"})).unwrap();
        let settings = stored.materialize("acme");

        assert_eq!(settings.languages, vec!["en".to_string()]);
        assert_eq!(settings.info.name, "acme");
        assert!(!settings.sync.enabled);
        assert_eq!(stored.languages, None);
    }

    #[test]
    fn unknown_fields_survive_a_rewrite() {
        let stored: StoredSettings =
            serde_json::from_value(json!({"usedBy": "project", "theme": "dark"})).unwrap();
        let written = serde_json::to_value(&stored).unwrap();
        assert_eq!(written["theme"], "dark");
        assert_eq!(written["usedBy"], "project");
    }

    #[test]
    fn endpoint_requires_enabled_and_complete_settings() {
        let mut sync = SyncSettings {
            enabled: false,
            url: Some("http://peer/api/".into()),
            project: Some("remote".into()),
            token: None,
        };
        assert_eq!(sync.endpoint(), None);
        sync.enabled = true;
        assert_eq!(sync.endpoint(), Some(("http://peer/api/", "remote")));
        sync.project = Some(" ".into());
        assert_eq!(sync.endpoint(), None);
    }

    #[test]
    fn settings_update_deduplicates_languages() {
        let mut stored = StoredSettings::baseline("Acme");
        SettingsUpdate {
            languages: Some(vec!["en".into(), "nl".into(), "en".into()]),
            ..SettingsUpdate::default()
        }
        .apply(&mut stored);
        assert_eq!(stored.languages, Some(vec!["en".to_string(), "nl".to_string()]));
        assert_eq!(stored.info.unwrap().name, "Acme");
    }
}
