/// Strata: multi-project content store with environments and peer sync
/// 
/// This library provides project lifecycle management, environment-scoped
/// document collections, a cached resource gateway and an HTTP sync client
/// that mirrors resources from a remote peer.

// Core configuration and setup
pub mod config;

// Request identity: project, environment, user and language
pub mod context;

// Domain error taxonomy shared by every layer
pub mod error;

// Document storage engine and environment namespacing of collections
pub mod storage;

// Project management layer - settings, environments, users and backups
pub mod project;

// Resource categories, cache, change events and the gateway
pub mod resource;

// Remote peer sync over HTTP
pub mod sync;

// HTTP API layer - REST endpoints for projects, environments and resources
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use config::Config;
pub use context::RequestContext;
pub use error::{Error, Result};
pub use project::{EnvironmentRegistry, Project, ProjectLifecycle};
pub use resource::{Category, ResourceGateway};
pub use server::start_server;
pub use sync::SyncClient;
