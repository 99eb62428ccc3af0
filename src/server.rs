/// Server setup and initialization
/// 
/// Wires together all components: storage, backups, users, sync client,
/// environment registry, project lifecycle, resource gateway and HTTP routes.
/// Provides the application factory used by the binary and the tests.

use crate::{
    api::{create_project_routes, create_resource_routes, AppState},
    config::Config,
    project::{
        EnvironmentRegistry, ProjectLifecycle, SqliteBackupManager, StoreUserDirectory, User,
        UserDirectory,
    },
    resource::{ResourceCache, ResourceEvents, ResourceGateway},
    storage::{SqliteDocumentStore, StorageEngine},
    sync::SyncClient,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build every service from configuration
pub async fn build_state(config: &Config) -> Result<AppState> {
    tracing::info!("📁 Ensuring project data directory exists: {}", config.database.project_data_dir);
    tokio::fs::create_dir_all(&config.database.project_data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create project data directory: {}", e))?;
    tokio::fs::create_dir_all(&config.database.backup_dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create backup directory: {}", e))?;

    tracing::info!("🏗️ Initializing project document store");
    let sqlite = Arc::new(SqliteDocumentStore::new(&config.database.project_data_dir));
    let store: Arc<dyn StorageEngine> = sqlite.clone();

    tracing::info!("💾 Initializing backup manager: {}", config.database.backup_dir);
    let backups = Arc::new(SqliteBackupManager::new(sqlite, &config.database.backup_dir));

    let users = Arc::new(StoreUserDirectory::new(Arc::clone(&store)));
    if let Some(admin) = &config.bootstrap_admin {
        if users.get_user_by_id(&admin.id).await?.is_none() {
            tracing::info!("👤 Bootstrapping administrator '{}'", admin.username);
            users
                .save_user(&User {
                    id: admin.id.clone(),
                    username: admin.username.clone(),
                    is_admin: true,
                    scopes: Default::default(),
                })
                .await?;
        }
    }

    let cache = Arc::new(ResourceCache::new());
    let events = ResourceEvents::new();

    tracing::info!(
        "🌍 Initializing sync client (read timeout {}ms, write timeout {}ms)",
        config.sync.read_timeout_ms,
        config.sync.write_timeout_ms
    );
    let sync = Arc::new(SyncClient::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        events.clone(),
        config.sync.timeouts(),
    ));

    let environments = Arc::new(EnvironmentRegistry::new(
        Arc::clone(&store),
        backups.clone(),
        Arc::clone(&sync),
        Arc::clone(&cache),
    ));

    let lifecycle = Arc::new(ProjectLifecycle::new(
        Arc::clone(&store),
        backups,
        users.clone(),
        Arc::clone(&environments),
        Arc::clone(&cache),
    ));

    let gateway = Arc::new(ResourceGateway::new(store, users, Arc::clone(&sync), cache, events));

    Ok(AppState {
        lifecycle,
        environments,
        gateway,
        sync,
    })
}

/// Router over an already built state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_project_routes())
        .merge(create_resource_routes())
        .with_state(state)
}

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    let state = build_state(&config).await?;
    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = router(state);
    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting strata server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
