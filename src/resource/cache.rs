//! Hot-reload category cache using ArcSwap
//!
//! Each reload swaps the whole map pointer, so readers holding an older
//! snapshot keep a consistent view while a reload is in flight.

use crate::error::Result;
use crate::resource::category::Category;
use crate::storage::StorageEngine;
use arc_swap::ArcSwap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies one cached category listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub project: String,
    /// `None` for categories shared by all environments of a project
    pub environment: Option<String>,
    pub category: Category,
}

impl CacheKey {
    pub fn new(project: &str, environment: &str, category: Category) -> Self {
        let collection = category.collection(environment);
        Self {
            project: project.to_string(),
            environment: collection.environment,
            category,
        }
    }
}

/// One cached listing and the ticket that produced it
///
/// `items` is `None` after an invalidation: the key stays as a tombstone so
/// that loads started before it are discarded.
#[derive(Debug, Clone)]
struct Slot {
    ticket: u64,
    items: Option<Arc<Vec<Value>>>,
}

/// Lock-free cache of category listings
///
/// Every load and every invalidation takes a ticket from one counter. A
/// loaded listing is installed only if no later ticket has touched its key,
/// and no broad invalidation happened since the load started.
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: ArcSwap<HashMap<CacheKey, Slot>>,
    tickets: AtomicU64,
    /// Ticket of the latest project or environment wide invalidation
    floor: AtomicU64,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Cached listing, if loaded
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<Value>>> {
        self.entries.load().get(key).and_then(|slot| slot.items.clone())
    }

    /// Force a full reload of one category from storage
    ///
    /// Always returns what was read; the cache only keeps it when nothing
    /// newer happened to the key meanwhile.
    pub async fn reload(
        &self,
        store: &dyn StorageEngine,
        project: &str,
        environment: &str,
        category: Category,
    ) -> Result<Arc<Vec<Value>>> {
        let key = CacheKey::new(project, environment, category);
        let ticket = self.next_ticket();
        let collection = category.collection(environment).collection_name();
        let items = Arc::new(store.find(project, &collection, &json!({})).await?);

        if self.install(&key, ticket, Arc::clone(&items)) {
            tracing::debug!("🔄 Reloaded {} ({} items) for {}", collection, items.len(), project);
        } else {
            tracing::debug!("Discarded outdated load of {} for {}", collection, project);
        }
        Ok(items)
    }

    fn install(&self, key: &CacheKey, ticket: u64, items: Arc<Vec<Value>>) -> bool {
        let mut installed = false;
        self.entries.rcu(|current| {
            let outdated = ticket <= self.floor.load(Ordering::SeqCst)
                || current.get(key).is_some_and(|slot| slot.ticket > ticket);
            installed = !outdated;
            let mut next = (**current).clone();
            if !outdated {
                next.insert(
                    key.clone(),
                    Slot {
                        ticket,
                        items: Some(Arc::clone(&items)),
                    },
                );
            }
            next
        });
        installed
    }

    /// Forget one listing; the next read reloads it
    pub fn invalidate(&self, key: &CacheKey) {
        let ticket = self.next_ticket();
        self.entries.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(key.clone(), Slot { ticket, items: None });
            next
        });
    }

    /// Drop every entry matching `predicate`, discarding loads in flight
    fn evict(&self, predicate: impl Fn(&CacheKey) -> bool) {
        let ticket = self.next_ticket();
        self.floor.fetch_max(ticket, Ordering::SeqCst);
        self.entries.rcu(|current| {
            current
                .iter()
                .filter(|(key, _)| !predicate(key))
                .map(|(key, slot)| (key.clone(), slot.clone()))
                .collect::<HashMap<_, _>>()
        });
    }

    pub fn invalidate_project(&self, project: &str) {
        self.evict(|key| key.project == project);
    }

    pub fn invalidate_environment(&self, project: &str, environment: &str) {
        self.evict(|key| key.project == project && key.environment.as_deref() == Some(environment));
    }

    /// Number of loaded listings
    pub fn len(&self) -> usize {
        self.entries
            .load()
            .values()
            .filter(|slot| slot.items.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
