//! Authorization collaborator: platform users and their project scopes
//!
//! Users are platform-wide and live in the reserved `users` database, outside
//! every project. This directory is the only user store: the `users` resource
//! category of a project is a view of it.

use crate::error::{require, Error, Result};
use crate::storage::{StorageEngine, UpdateOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

const USERS_DATABASE: &str = "users";
const USERS_COLLECTION: &str = "users";

/// A platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Project id -> scopes granted in that project
    #[serde(default)]
    pub scopes: BTreeMap<String, Vec<String>>,
}

/// A user as seen from one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
    pub scopes: Vec<String>,
}

impl User {
    pub fn has_access(&self, project: &str) -> bool {
        self.is_admin || self.scopes.contains_key(project)
    }

    pub fn for_project(&self, project: &str) -> UserRef {
        UserRef {
            id: self.id.clone(),
            username: self.username.clone(),
            is_admin: self.is_admin,
            scopes: self.scopes.get(project).cloned().unwrap_or_default(),
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Users with access to a project: scoped users plus every administrator
    async fn get_users_for_project(&self, project: &str) -> Result<Vec<UserRef>>;

    /// Insert or replace a user record
    async fn save_user(&self, user: &User) -> Result<()>;
}

/// User directory kept in the storage engine
#[derive(Clone)]
pub struct StoreUserDirectory {
    store: Arc<dyn StorageEngine>,
}

impl StoreUserDirectory {
    pub fn new(store: Arc<dyn StorageEngine>) -> Self {
        Self { store }
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        let documents = self.store.find(USERS_DATABASE, USERS_COLLECTION, &json!({})).await?;
        let mut users = Vec::with_capacity(documents.len());
        for document in documents {
            users.push(serde_json::from_value(document)?);
        }
        Ok(users)
    }
}

#[async_trait]
impl UserDirectory for StoreUserDirectory {
    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        require("userId", id)?;
        let found = self
            .store
            .find(USERS_DATABASE, USERS_COLLECTION, &json!({ "id": id }))
            .await?;
        match found.into_iter().next() {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    async fn get_users_for_project(&self, project: &str) -> Result<Vec<UserRef>> {
        Ok(self
            .all_users()
            .await?
            .iter()
            .filter(|user| user.has_access(project))
            .map(|user| user.for_project(project))
            .collect())
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        require("userId", &user.id)?;
        self.store
            .replace_one(
                USERS_DATABASE,
                USERS_COLLECTION,
                &json!({ "id": user.id }),
                &serde_json::to_value(user)?,
                UpdateOptions::upsert(),
            )
            .await?;
        Ok(())
    }
}

/// Resolve a user and require administrator rights
///
/// Unknown users are refused like non-admins.
pub async fn require_admin(directory: &dyn UserDirectory, user_id: &str) -> Result<User> {
    require("userId", user_id)?;
    match directory.get_user_by_id(user_id).await? {
        Some(user) if user.is_admin => Ok(user),
        Some(user) => Err(Error::Permission(format!(
            "user '{}' is not an administrator",
            user.username
        ))),
        None => Err(Error::Permission(format!("unknown user '{user_id}'"))),
    }
}
