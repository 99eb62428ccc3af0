//! Error taxonomy for strata.
//!
//! Lifecycle, registry, sync and gateway operations all return [`Result`].
//! The HTTP layer maps each variant onto a status code in `api`.

use crate::project::environments::DropReport;
use thiserror::Error;

/// All errors that can arise from project, environment, sync and resource operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required parameter was missing or malformed.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// A project, environment, category, user or resource does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The requesting user may not perform a privileged lifecycle operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A project with the derived id already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network, timeout, status or payload failure talking to a sync peer.
    #[error("sync transport error at {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Pull/push/token renewal requested for a project without enabled sync settings.
    #[error("sync is not enabled for project {project}")]
    SyncNotConfigured { project: String },

    /// Some collections of an environment could not be dropped.
    #[error("environment {environment} of project {project} was only partially deleted: {} failed, {} skipped", .report.failed.len(), .report.skipped.len())]
    PartialDeletion {
        project: String,
        environment: String,
        report: DropReport,
    },

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Filesystem failure (project directories, backup files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures that came from talking to a sync peer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Reject empty required string parameters.
pub(crate) fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "is required"));
    }
    Ok(())
}
