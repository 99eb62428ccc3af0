//! Category-based CRUD + sync contract consumed by the API layer
//!
//! Every mutation emits a [`ResourceChanged`](crate::resource::events::ResourceChanged)
//! for its category once it completed. Pull and push reload the category
//! before the event goes out, so subscribers never read a stale listing after
//! an explicit sync.
//!
//! The `users` category is served by the [`UserDirectory`]: a project's users
//! are the platform accounts with access to it, and only administrators may
//! change them.

use crate::context::RequestContext;
use crate::error::{require, Error, Result};
use crate::resource::cache::{CacheKey, ResourceCache};
use crate::project::types::RESERVED_DATABASES;
use crate::project::users::{require_admin, User, UserDirectory};
use crate::resource::category::{Category, Scope};
use crate::resource::events::ResourceEvents;
use crate::storage::{StorageEngine, UpdateOptions};
use crate::sync::SyncClient;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Arguments of a custom category action
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    pub method: String,
    pub query: HashMap<String, String>,
    pub payload: Option<Value>,
}

/// Escape hatch for category-specific operations (`<method> category/action`)
#[async_trait]
pub trait CustomAction: Send + Sync {
    async fn run(
        &self,
        store: &dyn StorageEngine,
        ctx: &RequestContext,
        category: Category,
        request: ActionRequest,
    ) -> Result<Value>;
}

pub struct ResourceGateway {
    store: Arc<dyn StorageEngine>,
    users: Arc<dyn UserDirectory>,
    sync: Arc<SyncClient>,
    cache: Arc<ResourceCache>,
    events: ResourceEvents,
    actions: HashMap<(Category, String), Arc<dyn CustomAction>>,
}

impl ResourceGateway {
    pub fn new(
        store: Arc<dyn StorageEngine>,
        users: Arc<dyn UserDirectory>,
        sync: Arc<SyncClient>,
        cache: Arc<ResourceCache>,
        events: ResourceEvents,
    ) -> Self {
        Self {
            store,
            users,
            sync,
            cache,
            events,
            actions: HashMap::new(),
        }
    }

    /// Register a custom action; its name shadows a record id of the same name
    pub fn with_action(
        mut self,
        category: Category,
        action: impl Into<String>,
        handler: Arc<dyn CustomAction>,
    ) -> Self {
        self.actions.insert((category, action.into()), handler);
        self
    }

    pub fn has_action(&self, category: Category, action: &str) -> bool {
        self.actions.contains_key(&(category, action.to_string()))
    }

    pub fn events(&self) -> &ResourceEvents {
        &self.events
    }

    async fn ensure_project(&self, ctx: &RequestContext) -> Result<()> {
        ctx.validate()?;
        if RESERVED_DATABASES.contains(&ctx.project.as_str())
            || !self.store.database_exists(&ctx.project).await?
        {
            return Err(Error::not_found("project", &ctx.project));
        }
        Ok(())
    }

    fn collection(ctx: &RequestContext, category: Category) -> String {
        category.collection(&ctx.environment).collection_name()
    }

    /// Record mutated outside a sync action: forget the listing and notify
    fn changed(&self, ctx: &RequestContext, category: Category) {
        self.cache
            .invalidate(&CacheKey::new(&ctx.project, &ctx.environment, category));
        self.events.emit(&ctx.project, &ctx.environment, category);
    }

    /// `GET category`
    pub async fn list(&self, ctx: &RequestContext, category: Category) -> Result<Arc<Vec<Value>>> {
        self.ensure_project(ctx).await?;
        if is_directory(category) {
            return self.list_users(&ctx.project).await;
        }
        let key = CacheKey::new(&ctx.project, &ctx.environment, category);
        if let Some(items) = self.cache.get(&key) {
            return Ok(items);
        }
        self.cache
            .reload(self.store.as_ref(), &ctx.project, &ctx.environment, category)
            .await
    }

    /// `GET category/id`
    pub async fn get(&self, ctx: &RequestContext, category: Category, id: &str) -> Result<Value> {
        self.ensure_project(ctx).await?;
        require("id", id)?;
        if is_directory(category) {
            return self.get_user(&ctx.project, id).await;
        }
        self.store
            .find(&ctx.project, &Self::collection(ctx, category), &json!({ "id": id }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(category.name(), id))
    }

    /// `POST category/new[?query]`
    ///
    /// The new record gets a fresh id; query parameters fill fields the
    /// payload leaves unset.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        category: Category,
        payload: Option<Value>,
        query: &HashMap<String, String>,
    ) -> Result<Value> {
        self.ensure_project(ctx).await?;
        let mut record = payload.unwrap_or_else(|| json!({}));
        if let Some(fields) = record.as_object_mut() {
            for (key, value) in query {
                fields
                    .entry(key.clone())
                    .or_insert_with(|| Value::String(value.clone()));
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        if is_directory(category) {
            return self.save_user(ctx, &id, record).await;
        }

        let mut record = category.decode(record)?;
        if let Some(fields) = record.as_object_mut() {
            fields.insert("id".to_string(), json!(id));
        }

        self.store
            .insert_one(&ctx.project, &Self::collection(ctx, category), &record)
            .await?;
        tracing::info!("📝 Created {}/{} in {}/{}", category, id, ctx.project, ctx.environment);

        self.changed(ctx, category);
        Ok(record)
    }

    /// `POST category/id` (upsert)
    pub async fn set(
        &self,
        ctx: &RequestContext,
        category: Category,
        id: &str,
        payload: Value,
    ) -> Result<Value> {
        self.ensure_project(ctx).await?;
        require("id", id)?;
        if is_directory(category) {
            return self.save_user(ctx, id, payload).await;
        }
        let mut record = category.decode(payload)?;
        if let Some(fields) = record.as_object_mut() {
            fields.insert("id".to_string(), json!(id));
        }

        self.store
            .replace_one(
                &ctx.project,
                &Self::collection(ctx, category),
                &json!({ "id": id }),
                &record,
                UpdateOptions::upsert(),
            )
            .await?;
        tracing::debug!("💾 Saved {}/{} in {}/{}", category, id, ctx.project, ctx.environment);

        self.changed(ctx, category);
        Ok(record)
    }

    /// `DELETE category/id`
    pub async fn remove(&self, ctx: &RequestContext, category: Category, id: &str) -> Result<()> {
        self.ensure_project(ctx).await?;
        require("id", id)?;
        if is_directory(category) {
            return self.revoke_user(ctx, id).await;
        }
        let removed = self
            .store
            .remove(&ctx.project, &Self::collection(ctx, category), &json!({ "id": id }))
            .await?;
        if removed == 0 {
            return Err(Error::not_found(category.name(), id));
        }
        tracing::info!("🗑️ Removed {}/{} from {}/{}", category, id, ctx.project, ctx.environment);

        self.changed(ctx, category);
        Ok(())
    }

    /// `POST category/pull/id`
    pub async fn pull(&self, ctx: &RequestContext, category: Category, id: &str) -> Result<Value> {
        self.ensure_project(ctx).await?;
        refuse_sync(category)?;
        let record = self.sync.pull(ctx, category, id).await?;
        self.events.emit(&ctx.project, &ctx.environment, category);
        Ok(record)
    }

    /// `POST category/push/id`
    pub async fn push(&self, ctx: &RequestContext, category: Category, id: &str) -> Result<()> {
        self.ensure_project(ctx).await?;
        refuse_sync(category)?;
        self.sync.push(ctx, category, id).await
    }

    async fn list_users(&self, project: &str) -> Result<Arc<Vec<Value>>> {
        let users = self
            .users
            .get_users_for_project(project)
            .await?
            .iter()
            .map(serde_json::to_value)
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(Arc::new(users))
    }

    async fn get_user(&self, project: &str, id: &str) -> Result<Value> {
        match self.users.get_user_by_id(id).await? {
            Some(user) if user.has_access(project) => Ok(serde_json::to_value(user.for_project(project))?),
            _ => Err(Error::not_found(Category::Users.name(), id)),
        }
    }

    async fn require_admin(&self, ctx: &RequestContext) -> Result<User> {
        let Some(user_id) = ctx.user_id.as_deref() else {
            return Err(Error::Permission(
                "only administrators may manage project users".to_string(),
            ));
        };
        require_admin(self.users.as_ref(), user_id).await
    }

    /// Grant `id` access to the project with the payload's username and
    /// scopes. Administrator rights are never granted here.
    async fn save_user(&self, ctx: &RequestContext, id: &str, payload: Value) -> Result<Value> {
        let admin = self.require_admin(ctx).await?;
        let record = Category::Users.decode(payload)?;
        let username = record
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let scopes: Vec<String> = match record.get("scopes") {
            Some(scopes) => serde_json::from_value(scopes.clone())
                .map_err(|e| Error::validation("scopes", e.to_string()))?,
            None => Vec::new(),
        };

        let mut user = self.users.get_user_by_id(id).await?.unwrap_or_else(|| User {
            id: id.to_string(),
            username: username.clone(),
            is_admin: false,
            scopes: BTreeMap::new(),
        });
        user.username = username;
        user.scopes.insert(ctx.project.clone(), scopes);
        self.users.save_user(&user).await?;

        tracing::info!("👤 '{}' granted '{}' access to {}", admin.username, user.username, ctx.project);
        self.changed(ctx, Category::Users);
        Ok(serde_json::to_value(user.for_project(&ctx.project))?)
    }

    /// Withdraw a user's scope in the project; the platform account stays
    async fn revoke_user(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let admin = self.require_admin(ctx).await?;
        let mut user = match self.users.get_user_by_id(id).await? {
            Some(user) if user.scopes.contains_key(&ctx.project) => user,
            _ => return Err(Error::not_found(Category::Users.name(), id)),
        };
        user.scopes.remove(&ctx.project);
        self.users.save_user(&user).await?;

        tracing::info!("👤 '{}' revoked access of '{}' to {}", admin.username, user.username, ctx.project);
        self.changed(ctx, Category::Users);
        Ok(())
    }

    /// `<method> category/action[?query]`
    pub async fn custom_query(
        &self,
        ctx: &RequestContext,
        method: &str,
        category: Category,
        action: &str,
        query: HashMap<String, String>,
        payload: Option<Value>,
    ) -> Result<Value> {
        self.ensure_project(ctx).await?;
        require("method", method)?;
        require("action", action)?;
        let handler = self
            .actions
            .get(&(category, action.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found("action", format!("{category}/{action}")))?;

        tracing::info!("⚡ Running {} {}/{} in {}/{}", method, category, action, ctx.project, ctx.environment);
        let request = ActionRequest {
            method: method.to_uppercase(),
            query,
            payload,
        };
        let result = handler.run(self.store.as_ref(), ctx, category, request).await?;

        if !is_directory(category) {
            self.cache
                .reload(self.store.as_ref(), &ctx.project, &ctx.environment, category)
                .await?;
        }
        self.events.emit(&ctx.project, &ctx.environment, category);
        Ok(result)
    }
}

fn is_directory(category: Category) -> bool {
    category.spec().scope == Scope::Directory
}

fn refuse_sync(category: Category) -> Result<()> {
    if is_directory(category) {
        return Err(Error::validation(
            "category",
            format!("{category} belong to the platform directory and are not synced"),
        ));
    }
    Ok(())
}
