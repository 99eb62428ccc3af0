//! Resource endpoints
//!
//! Verb/path convention under /api/{project}/{environment}:
//! - GET category, GET category/id
//! - POST category/id (upsert), DELETE category/id
//! - POST category/new[?query]
//! - POST category/pull/id, POST category/push/id
//! - <method> category/action[?query] for registered custom actions

use crate::api::{request_context, AppState};
use crate::error::Error;
use crate::resource::Category;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;

pub fn create_resource_routes() -> Router<AppState> {
    Router::new()
        .route("/api/{project}/{environment}/{category}", get(list_resources))
        .route("/api/{project}/{environment}/{category}/new", post(create_resource))
        .route("/api/{project}/{environment}/{category}/pull/{id}", post(pull_resource))
        .route("/api/{project}/{environment}/{category}/push/{id}", post(push_resource))
        .route("/api/{project}/{environment}/{category}/{key}", any(resource_item))
}

/// Empty bodies are "no payload"; anything else must be JSON
fn parse_body(body: &str) -> Result<Option<Value>, Error> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| Error::Validation {
            field: "payload",
            reason: e.to_string(),
        })
}

/// GET /api/{project}/{environment}/{category}
async fn list_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project, environment, category)): Path<(String, String, String)>,
) -> Result<Json<Value>, Error> {
    let ctx = request_context(&headers, project, environment);
    let category: Category = category.parse()?;
    let items = state.gateway.list(&ctx, category).await?;
    Ok(Json(Value::Array(items.as_ref().clone())))
}

/// POST /api/{project}/{environment}/{category}/new[?query]
async fn create_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project, environment, category)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Result<(StatusCode, Json<Value>), Error> {
    let ctx = request_context(&headers, project, environment);
    let category: Category = category.parse()?;
    let created = state
        .gateway
        .create(&ctx, category, parse_body(&body)?, &query)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /api/{project}/{environment}/{category}/pull/{id}
async fn pull_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project, environment, category, id)): Path<(String, String, String, String)>,
) -> Result<Json<Value>, Error> {
    let ctx = request_context(&headers, project, environment);
    let category: Category = category.parse()?;
    Ok(Json(state.gateway.pull(&ctx, category, &id).await?))
}

/// POST /api/{project}/{environment}/{category}/push/{id}
async fn push_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((project, environment, category, id)): Path<(String, String, String, String)>,
) -> Result<Json<Value>, Error> {
    let ctx = request_context(&headers, project, environment);
    let category: Category = category.parse()?;
    state.gateway.push(&ctx, category, &id).await?;
    Ok(Json(json!({ "pushed": id })))
}

/// Any method on /api/{project}/{environment}/{category}/{key}
///
/// A registered custom action named `key` takes the request; otherwise `key`
/// is a record id for GET / POST / DELETE.
async fn resource_item(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Path((project, environment, category, key)): Path<(String, String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Result<Response, Error> {
    let ctx = request_context(&headers, project, environment);
    let category: Category = category.parse()?;
    let payload = parse_body(&body)?;

    if state.gateway.has_action(category, &key) {
        let result = state
            .gateway
            .custom_query(&ctx, method.as_str(), category, &key, query, payload)
            .await?;
        return Ok(Json(result).into_response());
    }

    match method {
        Method::GET => Ok(Json(state.gateway.get(&ctx, category, &key).await?).into_response()),
        Method::POST => {
            let payload = payload.ok_or(Error::Validation {
                field: "payload",
                reason: "is required".to_string(),
            })?;
            Ok(Json(state.gateway.set(&ctx, category, &key, payload).await?).into_response())
        }
        Method::DELETE => {
            state.gateway.remove(&ctx, category, &key).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        _ => Ok(StatusCode::METHOD_NOT_ALLOWED.into_response()),
    }
}
