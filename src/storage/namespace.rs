//! Environment namespacing for collection names
//!
//! Environment-scoped collections are named `<environment>.<name>`; unscoped
//! collections (settings, users) use the bare name. Environment names never
//! contain the delimiter, so the first `.` always separates the two parts and
//! `live` can never match `livewire.content`.

use crate::error::{Error, Result};
use std::fmt;

/// Delimiter between environment and collection name
pub const DELIMITER: char = '.';

/// Structured collection name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    pub environment: Option<String>,
    pub name: String,
}

impl CollectionKey {
    pub fn scoped(environment: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
            name: name.into(),
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self {
            environment: None,
            name: name.into(),
        }
    }

    /// Split a stored collection name on its first delimiter
    pub fn parse(collection: &str) -> Self {
        match collection.split_once(DELIMITER) {
            Some((environment, name)) => Self::scoped(environment, name),
            None => Self::global(collection),
        }
    }

    /// Stored collection name
    pub fn collection_name(&self) -> String {
        match &self.environment {
            Some(environment) => format!("{environment}{DELIMITER}{}", self.name),
            None => self.name.clone(),
        }
    }

    /// True when this collection lives inside `environment`
    pub fn belongs_to(&self, environment: &str) -> bool {
        self.environment.as_deref() == Some(environment)
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.collection_name())
    }
}

/// Reject environment names that would break namespacing
pub fn validate_environment_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("environment", "is required"));
    }
    if name.contains(DELIMITER) {
        return Err(Error::validation(
            "environment",
            format!("'{name}' must not contain '{DELIMITER}'"),
        ));
    }
    Ok(())
}
