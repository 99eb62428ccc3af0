//! HTTP client for a project's sync peer
//!
//! Two failure policies:
//! - reads (`get_resource`) never fail: disabled sync, transport errors,
//!   timeouts, non-2xx answers and unparsable bodies all mean "no remote truth"
//! - pull/push/token renewal are deliberate user actions and surface every
//!   failure as [`Error::Transport`]

use crate::context::RequestContext;
use crate::error::{require, Error, Result};
use crate::project::settings::{load_settings, load_sync_settings, save_settings};
use crate::project::types::SyncSettings;
use crate::resource::cache::ResourceCache;
use crate::resource::category::Category;
use crate::resource::events::ResourceEvents;
use crate::storage::{StorageEngine, UpdateOptions};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Bounded timeouts for sync traffic
#[derive(Debug, Clone, Copy)]
pub struct SyncTimeouts {
    /// Applied to `get_resource`; expiry means "absent"
    pub read: Duration,
    /// Applied to pull/push; expiry is a hard error
    pub write: Duration,
}

impl Default for SyncTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_millis(3_000),
            write: Duration::from_millis(10_000),
        }
    }
}

/// Resolved peer address for one project
#[derive(Debug, Clone)]
struct Peer {
    base: String,
    project: String,
    token: Option<String>,
}

impl Peer {
    fn from_settings(settings: &SyncSettings) -> Option<Self> {
        let (url, project) = settings.endpoint()?;
        Some(Self {
            base: url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            token: settings.token.clone(),
        })
    }

    /// `<base>/<remote project>/[<environment>/]<path>`
    fn url(&self, environment: Option<&str>, path: &str) -> String {
        match environment {
            Some(environment) => format!("{}/{}/{}/{}", self.base, self.project, environment, path),
            None => format!("{}/{}/{}", self.base, self.project, path),
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        self.token
            .iter()
            .map(|token| ("token", token.clone()))
            .collect()
    }
}

/// Client for the sync peer configured in a project's settings
#[derive(Clone)]
pub struct SyncClient {
    http: reqwest::Client,
    store: Arc<dyn StorageEngine>,
    cache: Arc<ResourceCache>,
    events: ResourceEvents,
    timeouts: SyncTimeouts,
}

impl SyncClient {
    pub fn new(
        store: Arc<dyn StorageEngine>,
        cache: Arc<ResourceCache>,
        events: ResourceEvents,
        timeouts: SyncTimeouts,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
            cache,
            events,
            timeouts,
        }
    }

    /// Peer for a project, `None` when sync is disabled or incomplete
    async fn peer(&self, project: &str) -> Result<Option<Peer>> {
        Ok(load_sync_settings(self.store.as_ref(), project)
            .await?
            .and_then(|settings| Peer::from_settings(&settings)))
    }

    async fn required_peer(&self, project: &str) -> Result<Peer> {
        self.peer(project).await?.ok_or_else(|| Error::SyncNotConfigured {
            project: project.to_string(),
        })
    }

    /// Fetch a resource from the sync peer
    ///
    /// Returns `None` without any network call when sync is disabled, and
    /// `None` for every failure once a call was attempted.
    pub async fn get_resource(
        &self,
        project: &str,
        environment: Option<&str>,
        resource: &str,
    ) -> Option<Value> {
        let peer = match self.peer(project).await {
            Ok(Some(peer)) => peer,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("⚠️ Could not read sync settings of '{}': {}", project, e);
                return None;
            }
        };

        let url = peer.url(environment, resource);
        tracing::debug!("🌍 Sync read: GET {}", url);

        let response = match self
            .http
            .get(&url)
            .query(&peer.query())
            .timeout(self.timeouts.read)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("⚠️ Sync peer unreachable, using local state: {} ({})", url, e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("⚠️ Sync peer answered {} for {}, using local state", status, url);
            return None;
        }

        match response.json::<Value>().await {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("⚠️ Unreadable sync payload from {}: {}", url, e);
                None
            }
        }
    }

    /// Overwrite the local record with the peer's copy, then reload the category
    pub async fn pull(&self, ctx: &RequestContext, category: Category, id: &str) -> Result<Value> {
        ctx.validate()?;
        require("id", id)?;
        let peer = self.required_peer(&ctx.project).await?;
        let url = peer.url(Some(&ctx.environment), &format!("{}/{}", category, id));

        tracing::info!("⬇️ Pulling {}/{} for {}/{} from {}", category, id, ctx.project, ctx.environment, url);

        let response = self
            .http
            .get(&url)
            .query(&peer.query())
            .timeout(self.timeouts.write)
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(&url, format!("peer answered {status}")));
        }

        let mut record: Value = response
            .json()
            .await
            .map_err(|e| Error::transport(&url, format!("invalid payload: {e}")))?;
        let Some(fields) = record.as_object_mut() else {
            return Err(Error::transport(&url, "peer did not return an object"));
        };
        // stored under the requested id whatever the peer calls it
        fields.insert("id".to_string(), json!(id));

        let collection = category.collection(&ctx.environment).collection_name();
        self.store
            .replace_one(
                &ctx.project,
                &collection,
                &json!({ "id": id }),
                &record,
                UpdateOptions::upsert(),
            )
            .await?;

        self.cache
            .reload(self.store.as_ref(), &ctx.project, &ctx.environment, category)
            .await?;

        Ok(record)
    }

    /// Upload the local record as authoritative, reload the category and notify
    pub async fn push(&self, ctx: &RequestContext, category: Category, id: &str) -> Result<()> {
        ctx.validate()?;
        require("id", id)?;
        let peer = self.required_peer(&ctx.project).await?;

        let collection = category.collection(&ctx.environment).collection_name();
        let record = self
            .store
            .find(&ctx.project, &collection, &json!({ "id": id }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(category.name(), id))?;

        let url = peer.url(Some(&ctx.environment), &format!("{}/{}", category, id));
        tracing::info!("⬆️ Pushing {}/{} for {}/{} to {}", category, id, ctx.project, ctx.environment, url);

        let response = self
            .http
            .post(&url)
            .query(&peer.query())
            .json(&record)
            .timeout(self.timeouts.write)
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(&url, format!("peer answered {status}")));
        }

        self.cache
            .reload(self.store.as_ref(), &ctx.project, &ctx.environment, category)
            .await?;
        self.events.emit(&ctx.project, &ctx.environment, category);

        Ok(())
    }

    /// Log in on the peer and store the returned token in the project's sync settings
    pub async fn renew_token(&self, project: &str, username: &str, password: &str) -> Result<String> {
        require("project", project)?;
        require("username", username)?;

        let mut settings = load_settings(self.store.as_ref(), project)
            .await?
            .ok_or_else(|| Error::not_found("project", project))?;
        let mut sync = settings.sync.clone().unwrap_or_default();
        let url = match sync.endpoint() {
            Some((base, _)) => format!("{}/user/login", base.trim_end_matches('/')),
            None => {
                return Err(Error::SyncNotConfigured {
                    project: project.to_string(),
                })
            }
        };

        tracing::info!("🔑 Renewing sync token for '{}' at {}", project, url);

        let response = self
            .http
            .post(&url)
            .query(&[("persist", "true")])
            .json(&json!({ "username": username, "password": password }))
            .timeout(self.timeouts.write)
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(&url, format!("peer answered {status}")));
        }

        let token = match response
            .json::<Value>()
            .await
            .map_err(|e| Error::transport(&url, format!("invalid payload: {e}")))?
        {
            Value::String(token) if !token.is_empty() => token,
            _ => return Err(Error::transport(&url, "peer did not return a token")),
        };

        sync.token = Some(token.clone());
        settings.sync = Some(sync);
        save_settings(self.store.as_ref(), project, &settings).await?;

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_urls_include_remote_project_and_environment() {
        let peer = Peer::from_settings(&SyncSettings {
            enabled: true,
            url: Some("http://peer.example/api/".into()),
            project: Some("remote".into()),
            token: Some("t".into()),
        })
        .unwrap();

        assert_eq!(peer.url(None, "environments"), "http://peer.example/api/remote/environments");
        assert_eq!(
            peer.url(Some("live"), "content/a"),
            "http://peer.example/api/remote/live/content/a"
        );
        assert_eq!(peer.query(), vec![("token", "t".to_string())]);
    }

    #[test]
    fn disabled_settings_have_no_peer() {
        let settings = SyncSettings {
            enabled: false,
            url: Some("http://peer.example/api/".into()),
            project: Some("remote".into()),
            token: None,
        };
        assert!(Peer::from_settings(&settings).is_none());
    }
}
