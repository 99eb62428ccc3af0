//! Configuration management for strata
//!
//! Handles server binding, storage locations and sync peer timeouts.

use crate::sync::SyncTimeouts;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Sync peer configuration
    pub sync: SyncConfig,
    /// Administrator created at startup when absent
    pub bootstrap_admin: Option<AdminConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Storage locations for project databases and their backups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// One sub-directory per project: {project_data_dir}/{project}/project.db
    pub project_data_dir: String,
    /// Backups, kept apart so dropping a project keeps them
    pub backup_dir: String,
}

/// Bounded timeouts for sync peer traffic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Environment/resource reads; expiry falls back to local state
    pub read_timeout_ms: u64,
    /// Pull, push and token renewal; expiry is an error
    pub write_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub id: String,
    pub username: String,
}

impl SyncConfig {
    pub fn timeouts(&self) -> SyncTimeouts {
        SyncTimeouts {
            read: Duration::from_millis(self.read_timeout_ms),
            write: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("STRATA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("STRATA_PORT", 3004),
            },
            database: DatabaseConfig {
                project_data_dir: std::env::var("STRATA_DATA_DIR")
                    .unwrap_or_else(|_| "data/projects".to_string()),
                backup_dir: std::env::var("STRATA_BACKUP_DIR")
                    .unwrap_or_else(|_| "data/backups".to_string()),
            },
            sync: SyncConfig {
                read_timeout_ms: env_parse("STRATA_SYNC_READ_TIMEOUT_MS", 3_000),
                write_timeout_ms: env_parse("STRATA_SYNC_WRITE_TIMEOUT_MS", 10_000),
            },
            bootstrap_admin: std::env::var("STRATA_ADMIN_ID").ok().map(|id| AdminConfig {
                username: std::env::var("STRATA_ADMIN_USERNAME").unwrap_or_else(|_| id.clone()),
                id,
            }),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}
