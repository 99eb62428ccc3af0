//! HTTP API Layer
//!
//! Thin axum surface over the project lifecycle and the resource gateway:
//! - Project and environment management under /api/projects
//! - Resource CRUD + sync under /api/{project}/{environment}/{category}
//!
//! The requesting user travels in the `x-user-id` header, the locale in
//! `accept-language`.

pub mod projects;
pub mod resources;

pub use projects::create_project_routes;
pub use resources::create_resource_routes;

use crate::context::RequestContext;
use crate::error::Error;
use crate::project::{EnvironmentRegistry, ProjectLifecycle};
use crate::resource::ResourceGateway;
use crate::sync::SyncClient;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ProjectLifecycle>,
    pub environments: Arc<EnvironmentRegistry>,
    pub gateway: Arc<ResourceGateway>,
    pub sync: Arc<SyncClient>,
}

const USER_HEADER: &str = "x-user-id";

/// Requesting user id, empty when absent
pub(crate) fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Primary language tag of `accept-language`
pub(crate) fn language(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::ACCEPT_LANGUAGE)?.to_str().ok()?;
    let primary = header.split(',').next()?.split(';').next()?.trim();
    (!primary.is_empty() && primary != "*").then(|| primary.to_string())
}

pub(crate) fn request_context(headers: &HeaderMap, project: String, environment: String) -> RequestContext {
    let mut ctx = RequestContext::new(project, environment);
    let user = user_id(headers);
    if !user.is_empty() {
        ctx = ctx.with_user(user);
    }
    if let Some(language) = language(headers) {
        ctx = ctx.with_language(language);
    }
    ctx
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Permission(_) => StatusCode::FORBIDDEN,
            Error::Conflict(_) | Error::SyncNotConfigured { .. } => StatusCode::CONFLICT,
            Error::Transport { .. } => StatusCode::BAD_GATEWAY,
            Error::PartialDeletion { .. }
            | Error::Storage(_)
            | Error::Io(_)
            | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("❌ Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let body = match &self {
            Error::PartialDeletion { report, .. } => json!({ "error": self.to_string(), "report": report }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn context_reads_user_and_primary_language() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static(" u1 "));
        headers.insert(
            axum::http::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("nl-NL,nl;q=0.9,en;q=0.8"),
        );

        let ctx = request_context(&headers, "acme".into(), "live".into());
        assert_eq!(ctx.user_id.as_deref(), Some("u1"));
        assert_eq!(ctx.language, "nl-NL");
    }

    #[test]
    fn missing_headers_fall_back_to_defaults() {
        let ctx = request_context(&HeaderMap::new(), "acme".into(), "live".into());
        assert_eq!(ctx.user_id, None);
        assert_eq!(ctx.language, "en");
    }
}
