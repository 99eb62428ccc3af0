//! Project, environment and backup management endpoints
//!
//! Destructive and settings-changing routes require an administrator.

use crate::api::{user_id, AppState};
use crate::error::Error;
use crate::project::{
    BackupRef, EnvironmentDeletion, Project, ProjectDeletion, SettingsUpdate,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteProjectParams {
    /// Set to false to drop without a backup
    pub backup: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

pub fn create_project_routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", get(get_project).delete(delete_project))
        .route("/api/projects/{id}/settings", post(update_settings))
        .route("/api/projects/{id}/environments", get(list_environments))
        .route(
            "/api/projects/{id}/environments/{name}",
            post(add_environment).delete(delete_environment),
        )
        .route("/api/projects/{id}/backups", get(list_backups).post(create_backup))
        .route("/api/projects/{id}/sync/token", post(renew_token))
}

/// GET /api/projects
async fn list_projects(State(state): State<AppState>) -> Result<Json<Value>, Error> {
    let projects = state.lifecycle.list_projects().await?;
    Ok(Json(json!({ "projects": projects })))
}

/// POST /api/projects
/// Body: { "name": "My Site" }
async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), Error> {
    let project = state
        .lifecycle
        .create_project(&payload.name, &user_id(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects/{id}
async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, Error> {
    Ok(Json(state.lifecycle.get_project(&id).await?))
}

/// DELETE /api/projects/{id}[?backup=false]
async fn delete_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<DeleteProjectParams>,
) -> Result<Json<ProjectDeletion>, Error> {
    state.lifecycle.authorize_admin(&user_id(&headers)).await?;
    let make_backup = params.backup.unwrap_or(true);
    Ok(Json(state.lifecycle.delete_project(&id, make_backup).await?))
}

/// POST /api/projects/{id}/settings
/// Body: { "languages": [...], "name": "...", "sync": {...} } (all optional)
async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Project>, Error> {
    let project = state
        .lifecycle
        .update_settings(&id, update, &user_id(&headers))
        .await?;
    Ok(Json(project))
}

/// GET /api/projects/{id}/environments
async fn list_environments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, Error> {
    if !state.lifecycle.project_exists(&id).await? {
        return Err(Error::NotFound {
            kind: "project",
            id,
        });
    }
    Ok(Json(state.environments.list_environments(&id).await?))
}

/// POST /api/projects/{id}/environments/{name}
async fn add_environment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<Value>, Error> {
    state.lifecycle.authorize_admin(&user_id(&headers)).await?;
    let environment = state.environments.add_environment(&id, &name).await?;
    Ok(Json(json!({ "environment": environment })))
}

/// DELETE /api/projects/{id}/environments/{name}
///
/// Partial failures answer 500 with the per-collection report.
async fn delete_environment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<EnvironmentDeletion>, Error> {
    state.lifecycle.authorize_admin(&user_id(&headers)).await?;
    Ok(Json(state.environments.delete_environment(&id, &name).await?))
}

/// GET /api/projects/{id}/backups
async fn list_backups(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BackupRef>>, Error> {
    Ok(Json(state.lifecycle.list_backups(&id).await?))
}

/// POST /api/projects/{id}/backups
async fn create_backup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<BackupRef>), Error> {
    state.lifecycle.authorize_admin(&user_id(&headers)).await?;
    let backup = state.lifecycle.create_backup(&id).await?;
    Ok((StatusCode::CREATED, Json(backup)))
}

/// POST /api/projects/{id}/sync/token
/// Body: { "username": "...", "password": "..." }
async fn renew_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(credentials): Json<TokenRequest>,
) -> Result<Json<Value>, Error> {
    state.lifecycle.authorize_admin(&user_id(&headers)).await?;
    let token = state
        .sync
        .renew_token(&id, &credentials.username, &credentials.password)
        .await?;
    Ok(Json(json!({ "token": token })))
}
