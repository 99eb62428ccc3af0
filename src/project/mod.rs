//! Project management module
//!
//! Handles project lifecycle, environment derivation, backups and the users
//! allowed into a project. Each project owns one isolated database; its
//! environments are namespaces inside it.

pub mod backup;
pub mod environments;
pub mod lifecycle;
pub mod settings;
pub mod types;
pub mod users;

pub use backup::{BackupManager, BackupRef, SqliteBackupManager};
pub use environments::{CancelToken, DropReport, EnvironmentDeletion, EnvironmentRegistry};
pub use lifecycle::{ProjectDeletion, ProjectLifecycle};
pub use types::{Project, ProjectSettings, SettingsUpdate, SyncSettings};
pub use users::{StoreUserDirectory, User, UserDirectory, UserRef};
