//! Resource layer
//!
//! The stable, category-based contract exposed to UI and API consumers:
//! - `category`: static registry of the six resource kinds
//! - `cache`: hot-swapped per-category listings
//! - `events`: resource-changed notifications
//! - `gateway`: CRUD + pull/push + custom actions

pub mod cache;
pub mod category;
pub mod events;
pub mod gateway;

pub use cache::{CacheKey, ResourceCache};
pub use category::Category;
pub use events::{ResourceChanged, ResourceEvents};
pub use gateway::{ActionRequest, CustomAction, ResourceGateway};
