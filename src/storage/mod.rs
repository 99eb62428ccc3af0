//! Storage engine layer
//!
//! Document-store abstraction with per-tenant databases and named collections.
//! Each project owns exactly one database; environments are namespaced inside it
//! through collection names (see [`namespace`]).

pub mod namespace;
pub mod sqlite;

pub use namespace::CollectionKey;
pub use sqlite::SqliteDocumentStore;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Options for [`StorageEngine::update_one`] and [`StorageEngine::replace_one`]
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches the filter
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Outcome of a single-document write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    /// An existing document matched the filter and was written
    pub matched: bool,
    /// No document matched and a new one was inserted
    pub upserted: bool,
}

/// Per-tenant document store
///
/// Filters are JSON objects compared by top-level field equality; an empty
/// object (or `null`) matches every document. Only single-collection operations
/// are atomic.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// All tenant databases known to the engine
    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn database_exists(&self, name: &str) -> Result<bool>;

    /// Create an empty database, failing with `Conflict` if it already exists
    async fn create_database(&self, name: &str) -> Result<()>;

    /// Drop a database and everything in it. Returns false if it did not exist.
    async fn drop_database(&self, name: &str) -> Result<bool>;

    async fn list_collections(&self, db: &str) -> Result<Vec<String>>;

    /// Drop a collection. Returns false if it did not exist.
    async fn drop_collection(&self, db: &str, name: &str) -> Result<bool>;

    async fn find(&self, db: &str, collection: &str, filter: &Value) -> Result<Vec<Value>>;

    /// Shallow-merge `update` into the first matching document
    async fn update_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Value,
        update: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateResult>;

    /// Replace the first matching document wholesale
    async fn replace_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Value,
        document: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateResult>;

    /// Insert a document, returning its storage id
    async fn insert_one(&self, db: &str, collection: &str, document: &Value) -> Result<String>;

    /// Remove every matching document, returning how many were removed
    async fn remove(&self, db: &str, collection: &str, filter: &Value) -> Result<u64>;
}

/// Top-level equality match of `document` against `filter`
pub fn matches_filter(document: &Value, filter: &Value) -> bool {
    match filter {
        Value::Null => true,
        Value::Object(fields) => fields
            .iter()
            .all(|(key, expected)| document.get(key) == Some(expected)),
        _ => false,
    }
}

/// Shallow merge of `update` over `base`; non-object bases are replaced
pub fn merge_fields(base: &Value, update: &Value) -> Value {
    let mut merged = match base {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    if let Value::Object(fields) = update {
        for (key, value) in fields {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}
