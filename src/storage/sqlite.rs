//! SQLite-backed document store with one isolated database per project
//!
//! Layout on disk:
//! - {data_dir}/{project}/project.db: collections and their JSON documents
//!
//! Pools are lazily created and cached; reads against a project that does not
//! exist never create it.

use crate::error::{Error, Result};
use crate::storage::{matches_filter, merge_fields, StorageEngine, UpdateOptions, UpdateResult};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const DATABASE_FILE: &str = "project.db";

/// Project database manager with isolated connection pools
#[derive(Debug)]
pub struct SqliteDocumentStore {
    /// Connection pools keyed by database (project) name
    pools: RwLock<HashMap<String, SqlitePool>>,
    /// Base directory holding one sub-directory per database
    data_dir: PathBuf,
}

impl SqliteDocumentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn database_dir(&self, db: &str) -> PathBuf {
        self.data_dir.join(db)
    }

    /// Get or create the pool for a database
    ///
    /// Fast path under the read lock, double-checked under the write lock.
    async fn pool(&self, db: &str) -> Result<SqlitePool> {
        validate_database_name(db)?;
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(db) {
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(db) {
            return Ok(pool.clone());
        }

        let dir = self.database_dir(db);
        tokio::fs::create_dir_all(&dir).await?;
        let db_path = dir.join(DATABASE_FILE);

        tracing::info!("🗄️ Opening project database: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        init_schema(&pool).await?;

        pools.insert(db.to_string(), pool.clone());
        Ok(pool)
    }

    /// Pool for a database that already exists on disk
    async fn existing_pool(&self, db: &str) -> Result<Option<SqlitePool>> {
        validate_database_name(db)?;
        if let Some(pool) = self.pools.read().await.get(db) {
            return Ok(Some(pool.clone()));
        }
        if !tokio::fs::try_exists(self.database_dir(db)).await? {
            return Ok(None);
        }
        self.pool(db).await.map(Some)
    }

    /// Write a consistent copy of a database to `destination`
    pub async fn snapshot_into(&self, db: &str, destination: &Path) -> Result<()> {
        let pool = self
            .existing_pool(db)
            .await?
            .ok_or_else(|| Error::not_found("project", db))?;
        let target = destination.to_string_lossy().replace('\'', "''");
        sqlx::query(&format!("VACUUM INTO '{target}'"))
            .execute(&pool)
            .await?;
        Ok(())
    }

    /// Number of open pools
    pub async fn open_pools(&self) -> usize {
        self.pools.read().await.len()
    }

    async fn write_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Value,
        document: &Value,
        options: UpdateOptions,
        merge: bool,
    ) -> Result<UpdateResult> {
        let pool = self.pool(db).await?;
        let mut tx = pool.begin().await?;

        let rows = sqlx::query("SELECT doc_id, body FROM documents WHERE collection = ? ORDER BY rowid")
            .bind(collection)
            .fetch_all(&mut *tx)
            .await?;

        for row in rows {
            let body: String = row.get("body");
            let body: Value = serde_json::from_str(&body)?;
            if !matches_filter(&body, filter) {
                continue;
            }
            let doc_id: String = row.get("doc_id");
            let next = if merge {
                merge_fields(&body, document)
            } else {
                document.clone()
            };
            sqlx::query(
                "UPDATE documents SET body = ?, updated_at = CURRENT_TIMESTAMP WHERE collection = ? AND doc_id = ?",
            )
            .bind(serde_json::to_string(&next)?)
            .bind(collection)
            .bind(&doc_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(UpdateResult {
                matched: true,
                upserted: false,
            });
        }

        if !options.upsert {
            return Ok(UpdateResult::default());
        }

        let inserted = if merge {
            merge_fields(filter, document)
        } else {
            document.clone()
        };
        insert_document(&mut tx, collection, &inserted).await?;
        tx.commit().await?;
        Ok(UpdateResult {
            matched: false,
            upserted: true,
        })
    }
}

#[async_trait]
impl StorageEngine for SqliteDocumentStore {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn database_exists(&self, name: &str) -> Result<bool> {
        validate_database_name(name)?;
        Ok(tokio::fs::try_exists(self.database_dir(name)).await?)
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        validate_database_name(name)?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        // create_dir fails on an existing directory: this is the uniqueness check
        match tokio::fs::create_dir(self.database_dir(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::Conflict(format!("database '{name}' already exists")));
            }
            Err(e) => return Err(e.into()),
        }
        self.pool(name).await?;
        tracing::info!("✅ Created project database: {}", name);
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<bool> {
        validate_database_name(name)?;
        if let Some(pool) = self.pools.write().await.remove(name) {
            pool.close().await;
        }
        let dir = self.database_dir(name);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir).await?;
        tracing::info!("🗑️ Dropped project database: {}", name);
        Ok(true)
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>> {
        let Some(pool) = self.existing_pool(db).await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query("SELECT name FROM collections ORDER BY name")
            .fetch_all(&pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn drop_collection(&self, db: &str, name: &str) -> Result<bool> {
        let Some(pool) = self.existing_pool(db).await? else {
            return Ok(false);
        };
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM documents WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let dropped = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(dropped.rows_affected() > 0)
    }

    async fn find(&self, db: &str, collection: &str, filter: &Value) -> Result<Vec<Value>> {
        let Some(pool) = self.existing_pool(db).await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query("SELECT body FROM documents WHERE collection = ? ORDER BY rowid")
            .bind(collection)
            .fetch_all(&pool)
            .await?;

        let mut documents = Vec::new();
        for row in rows {
            let body: String = row.get("body");
            let body: Value = serde_json::from_str(&body)?;
            if matches_filter(&body, filter) {
                documents.push(body);
            }
        }
        Ok(documents)
    }

    async fn update_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Value,
        update: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        self.write_one(db, collection, filter, update, options, true).await
    }

    async fn replace_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Value,
        document: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        self.write_one(db, collection, filter, document, options, false).await
    }

    async fn insert_one(&self, db: &str, collection: &str, document: &Value) -> Result<String> {
        let pool = self.pool(db).await?;
        let mut tx = pool.begin().await?;
        let id = insert_document(&mut tx, collection, document).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn remove(&self, db: &str, collection: &str, filter: &Value) -> Result<u64> {
        let Some(pool) = self.existing_pool(db).await? else {
            return Ok(0);
        };
        let mut tx = pool.begin().await?;
        let rows = sqlx::query("SELECT doc_id, body FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&mut *tx)
            .await?;

        let mut removed = 0;
        for row in rows {
            let body: String = row.get("body");
            let body: Value = serde_json::from_str(&body)?;
            if !matches_filter(&body, filter) {
                continue;
            }
            let doc_id: String = row.get("doc_id");
            removed += sqlx::query("DELETE FROM documents WHERE collection = ? AND doc_id = ?")
                .bind(collection)
                .bind(&doc_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }
}

/// Create tables for collections and their documents
async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            body JSON NOT NULL,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (collection, doc_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a document, registering its collection on first use.
///
/// The document's own string `id` is used as storage id when present.
async fn insert_document(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
    document: &Value,
) -> Result<String> {
    let doc_id = document
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    sqlx::query("INSERT OR IGNORE INTO collections (name) VALUES (?)")
        .bind(collection)
        .execute(&mut **tx)
        .await?;
    sqlx::query("INSERT INTO documents (collection, doc_id, body) VALUES (?, ?, ?)")
        .bind(collection)
        .bind(&doc_id)
        .bind(serde_json::to_string(document)?)
        .execute(&mut **tx)
        .await?;

    Ok(doc_id)
}

/// Database names double as directory names
fn validate_database_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(Error::validation(
            "project",
            format!("'{name}' is not a valid database name"),
        ));
    }
    Ok(())
}
