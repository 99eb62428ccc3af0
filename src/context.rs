//! Explicit per-request context threaded through every call that needs a
//! project, environment, user or locale.

use crate::error::{require, Result};
use crate::project::types::DEFAULT_LANGUAGE;
use crate::storage::namespace::validate_environment_name;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub project: String,
    pub environment: String,
    /// Requesting user, when the caller is authenticated
    pub user_id: Option<String>,
    pub language: String,
}

impl RequestContext {
    pub fn new(project: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            user_id: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        require("project", &self.project)?;
        validate_environment_name(&self.environment)
    }
}
