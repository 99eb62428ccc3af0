//! Resource-changed notifications

use crate::resource::category::Category;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// A category changed in one project environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChanged {
    pub project: String,
    pub environment: String,
    pub category: Category,
}

/// Broadcast bus for [`ResourceChanged`]
#[derive(Debug, Clone)]
pub struct ResourceEvents {
    sender: broadcast::Sender<ResourceChanged>,
}

impl ResourceEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceChanged> {
        self.sender.subscribe()
    }

    pub fn emit(&self, project: &str, environment: &str, category: Category) {
        let event = ResourceChanged {
            project: project.to_string(),
            environment: environment.to_string(),
            category,
        };
        // no subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for ResourceEvents {
    fn default() -> Self {
        Self::new()
    }
}
