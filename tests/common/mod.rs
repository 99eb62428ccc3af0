//! Shared harness for integration tests: services on temporary directories,
//! failure-injecting collaborators and an in-process fake sync peer.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata::error::{Error, Result};
use strata::project::{
    BackupManager, BackupRef, CancelToken, EnvironmentRegistry, ProjectLifecycle,
    SettingsUpdate, SqliteBackupManager, StoreUserDirectory, SyncSettings, User, UserDirectory,
};
use strata::resource::{ResourceCache, ResourceEvents, ResourceGateway};
use strata::storage::{SqliteDocumentStore, StorageEngine, UpdateOptions, UpdateResult};
use strata::sync::{SyncClient, SyncTimeouts};
use tempfile::TempDir;

pub const ADMIN: &str = "admin-1";
pub const EDITOR: &str = "editor-1";

/// Knobs for [`Harness::build`]
#[derive(Default)]
pub struct Options {
    /// Every backup attempt fails
    pub failing_backups: bool,
    /// Collections whose drop fails
    pub failing_drops: Vec<String>,
    /// Cancelled right after the first successful collection drop
    pub cancel_on_drop: Option<CancelToken>,
    /// Collections whose `remove` fails
    pub failing_removes: Vec<String>,
    /// Collections whose `update_one`/`replace_one` fail
    pub failing_writes: Vec<String>,
    pub timeouts: Option<SyncTimeouts>,
}

pub struct Harness {
    pub data_dir: TempDir,
    pub backup_dir: TempDir,
    pub sqlite: Arc<SqliteDocumentStore>,
    pub store: Arc<dyn StorageEngine>,
    pub cache: Arc<ResourceCache>,
    pub events: ResourceEvents,
    pub sync: Arc<SyncClient>,
    pub environments: Arc<EnvironmentRegistry>,
    pub lifecycle: ProjectLifecycle,
    pub gateway: ResourceGateway,
    pub users: Arc<StoreUserDirectory>,
    find_delay: Arc<Mutex<Duration>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(Options::default()).await
    }

    pub async fn build(options: Options) -> Self {
        Self::build_with(options, |gateway| gateway).await
    }

    /// Build, letting the caller register custom actions on the gateway
    pub async fn build_with(
        options: Options,
        configure: impl FnOnce(ResourceGateway) -> ResourceGateway,
    ) -> Self {
        let data_dir = TempDir::new().expect("data tempdir");
        let backup_dir = TempDir::new().expect("backup tempdir");

        let sqlite = Arc::new(SqliteDocumentStore::new(data_dir.path()));
        let find_delay = Arc::new(Mutex::new(Duration::ZERO));
        let store: Arc<dyn StorageEngine> = Arc::new(FaultyStore {
            inner: Arc::clone(&sqlite),
            failing_drops: options.failing_drops,
            failing_removes: options.failing_removes,
            failing_writes: options.failing_writes,
            cancel_on_drop: options.cancel_on_drop,
            find_delay: Arc::clone(&find_delay),
        });

        let backups: Arc<dyn BackupManager> = if options.failing_backups {
            Arc::new(FailingBackups)
        } else {
            Arc::new(SqliteBackupManager::new(Arc::clone(&sqlite), backup_dir.path()))
        };

        let users = Arc::new(StoreUserDirectory::new(Arc::clone(&store)));
        users
            .save_user(&User {
                id: ADMIN.into(),
                username: "admin".into(),
                is_admin: true,
                scopes: BTreeMap::new(),
            })
            .await
            .expect("seed admin");
        users
            .save_user(&User {
                id: EDITOR.into(),
                username: "editor".into(),
                is_admin: false,
                scopes: BTreeMap::from([("acme".to_string(), vec!["content".to_string()])]),
            })
            .await
            .expect("seed editor");

        let cache = Arc::new(ResourceCache::new());
        let events = ResourceEvents::new();
        let timeouts = options.timeouts.unwrap_or(SyncTimeouts {
            read: Duration::from_millis(500),
            write: Duration::from_millis(500),
        });
        let sync = Arc::new(SyncClient::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            events.clone(),
            timeouts,
        ));
        let environments = Arc::new(EnvironmentRegistry::new(
            Arc::clone(&store),
            Arc::clone(&backups),
            Arc::clone(&sync),
            Arc::clone(&cache),
        ));
        let lifecycle = ProjectLifecycle::new(
            Arc::clone(&store),
            backups,
            users.clone(),
            Arc::clone(&environments),
            Arc::clone(&cache),
        );
        let gateway = configure(ResourceGateway::new(
            Arc::clone(&store),
            users.clone(),
            Arc::clone(&sync),
            Arc::clone(&cache),
            events.clone(),
        ));

        Self {
            data_dir,
            backup_dir,
            sqlite,
            store,
            cache,
            events,
            sync,
            environments,
            lifecycle,
            gateway,
            users,
            find_delay,
        }
    }

    /// Delay every subsequent `find` after it has read from storage
    pub fn slow_finds(&self, delay: Duration) {
        *self.find_delay.lock().unwrap() = delay;
    }

    /// Create a project as the admin and return its id
    pub async fn project(&self, name: &str) -> String {
        self.lifecycle
            .create_project(name, ADMIN)
            .await
            .expect("create project")
            .id
    }

    /// Point a project at a fake peer
    pub async fn enable_sync(&self, project: &str, peer: &FakePeer) {
        self.lifecycle
            .update_settings(
                project,
                SettingsUpdate {
                    sync: Some(SyncSettings {
                        enabled: true,
                        url: Some(peer.url()),
                        project: Some("remote".into()),
                        token: Some("secret".into()),
                    }),
                    ..SettingsUpdate::default()
                },
                ADMIN,
            )
            .await
            .expect("enable sync");
    }

    /// Seed a document straight into a collection
    pub async fn seed(&self, project: &str, collection: &str, document: Value) {
        self.store
            .insert_one(project, collection, &document)
            .await
            .expect("seed document");
    }

    pub async fn collections(&self, project: &str) -> Vec<String> {
        self.store.list_collections(project).await.expect("list collections")
    }

    pub async fn evidence(&self, project: &str, environment: &str) -> Vec<Value> {
        self.store
            .find(project, "settings", &json!({ "usedBy": environment }))
            .await
            .expect("find evidence")
    }
}

/// Backup manager that always fails
pub struct FailingBackups;

#[async_trait]
impl BackupManager for FailingBackups {
    async fn create_backup(&self, project: &str) -> Result<BackupRef> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("backup volume unavailable for {project}"),
        )))
    }

    async fn get_backups_for_project(&self, _project: &str) -> Result<Vec<BackupRef>> {
        Ok(Vec::new())
    }
}

/// SQLite store with injectable failures, delays and cancellation
pub struct FaultyStore {
    inner: Arc<SqliteDocumentStore>,
    failing_drops: Vec<String>,
    failing_removes: Vec<String>,
    failing_writes: Vec<String>,
    cancel_on_drop: Option<CancelToken>,
    find_delay: Arc<Mutex<Duration>>,
}

fn injected(collection: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("injected failure on {collection}"),
    ))
}

#[async_trait]
impl StorageEngine for FaultyStore {
    async fn list_databases(&self) -> Result<Vec<String>> {
        self.inner.list_databases().await
    }

    async fn database_exists(&self, name: &str) -> Result<bool> {
        self.inner.database_exists(name).await
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        self.inner.create_database(name).await
    }

    async fn drop_database(&self, name: &str) -> Result<bool> {
        self.inner.drop_database(name).await
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>> {
        self.inner.list_collections(db).await
    }

    async fn drop_collection(&self, db: &str, name: &str) -> Result<bool> {
        if self.failing_drops.iter().any(|failing| failing == name) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("collection {name} is locked"),
            )));
        }
        let dropped = self.inner.drop_collection(db, name).await?;
        if let Some(token) = &self.cancel_on_drop {
            token.cancel();
        }
        Ok(dropped)
    }

    async fn find(&self, db: &str, collection: &str, filter: &Value) -> Result<Vec<Value>> {
        let found = self.inner.find(db, collection, filter).await?;
        let delay = *self.find_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(found)
    }

    async fn update_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Value,
        update: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        if self.failing_writes.iter().any(|failing| failing == collection) {
            return Err(injected(collection));
        }
        self.inner.update_one(db, collection, filter, update, options).await
    }

    async fn replace_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Value,
        document: &Value,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        if self.failing_writes.iter().any(|failing| failing == collection) {
            return Err(injected(collection));
        }
        self.inner.replace_one(db, collection, filter, document, options).await
    }

    async fn insert_one(&self, db: &str, collection: &str, document: &Value) -> Result<String> {
        self.inner.insert_one(db, collection, document).await
    }

    async fn remove(&self, db: &str, collection: &str, filter: &Value) -> Result<u64> {
        if self.failing_removes.iter().any(|failing| failing == collection) {
            return Err(injected(collection));
        }
        self.inner.remove(db, collection, filter).await
    }
}

#[derive(Default)]
struct PeerState {
    calls: AtomicUsize,
    environments: Mutex<Option<Value>>,
    records: Mutex<HashMap<String, Value>>,
    delay: Mutex<Duration>,
    seen_tokens: Mutex<Vec<String>>,
}

/// In-process sync peer bound to an ephemeral port
///
/// Routes: GET {project}/environments, GET|POST {project}/{env}/{category}/{id},
/// POST user/login. Every request is counted.
pub struct FakePeer {
    addr: std::net::SocketAddr,
    state: Arc<PeerState>,
}

impl FakePeer {
    pub async fn start() -> Self {
        let state = Arc::new(PeerState::default());
        let app = Router::new()
            .route("/user/login", post(peer_login))
            .route("/{project}/environments", get(peer_environments))
            .route(
                "/{project}/{environment}/{category}/{id}",
                get(peer_get_record).post(peer_put_record),
            )
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake peer");
        let addr = listener.local_addr().expect("peer address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake peer");
        });

        Self { addr, state }
    }

    /// API root as configured in project settings
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn set_environments(&self, value: Value) {
        *self.state.environments.lock().unwrap() = Some(value);
    }

    /// Record keyed by "{environment}/{category}/{id}"
    pub fn set_record(&self, key: &str, value: Value) {
        self.state.records.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn record(&self, key: &str) -> Option<Value> {
        self.state.records.lock().unwrap().get(key).cloned()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.state.seen_tokens.lock().unwrap().clone()
    }
}

/// Unreachable address for "peer is down" scenarios
pub fn dead_peer_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("address");
    drop(listener);
    format!("http://{addr}/")
}

async fn enter(state: &PeerState) {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

async fn peer_environments(
    State(state): State<Arc<PeerState>>,
    Path(_project): Path<String>,
    axum::extract::Query(query): axum::extract::Query<HashMap<String, String>>,
) -> Response {
    enter(&state).await;
    if let Some(token) = query.get("token") {
        state.seen_tokens.lock().unwrap().push(token.clone());
    }
    let environments = state.environments.lock().unwrap().clone();
    match environments {
        Some(value) => Json(value).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn peer_get_record(
    State(state): State<Arc<PeerState>>,
    Path((_project, environment, category, id)): Path<(String, String, String, String)>,
) -> Response {
    enter(&state).await;
    let key = format!("{environment}/{category}/{id}");
    let record = state.records.lock().unwrap().get(&key).cloned();
    match record {
        Some(value) => Json(value).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn peer_put_record(
    State(state): State<Arc<PeerState>>,
    Path((_project, environment, category, id)): Path<(String, String, String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    enter(&state).await;
    let key = format!("{environment}/{category}/{id}");
    state.records.lock().unwrap().insert(key, body);
    StatusCode::OK
}

async fn peer_login(State(state): State<Arc<PeerState>>, Json(body): Json<Value>) -> Response {
    enter(&state).await;
    if body["password"] == "hunter2" {
        Json(json!("fresh-token")).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}
