//! Listener registry adapter.
//!
//! The registry backend is an external key-value store with TTL'd items
//! and snapshot subscriptions; [`ListenerStore`] is the slice of its API
//! this gateway consumes. The adapter decodes store snapshots into
//! listener records and feeds them to the dispatch engine, and writes new
//! registrations back. [`MemoryStore`] is the bundled single-node
//! implementation used in tests and standalone deployments.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fanout_core::{Clock, CoreError, Listener, Registration};
use fanout_delivery::SenderWrapper;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// One item in the external listener store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreItem {
    /// Store key; this gateway uses the listener URL.
    pub identifier: String,
    /// Opaque payload; a serialized [`Listener`] for items this gateway
    /// wrote.
    pub data: serde_json::Value,
    /// Item lifetime in seconds.
    pub ttl: u64,
}

/// Errors surfaced by the listener store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("listener store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the registration path.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registration payload failed validation.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// The store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The slice of the external store API this gateway consumes.
#[async_trait]
pub trait ListenerStore: Send + Sync {
    /// Returns every live item.
    async fn get_items(&self) -> Result<Vec<StoreItem>, StoreError>;

    /// Writes an item, returning its identifier.
    async fn push_item(&self, item: StoreItem, owner: &str) -> Result<String, StoreError>;

    /// Subscribes to item snapshots. The receiver's current value is always
    /// the latest snapshot.
    fn subscribe(&self) -> watch::Receiver<Vec<StoreItem>>;
}

struct StoredEntry {
    item: StoreItem,
    expires_at: DateTime<Utc>,
}

/// In-memory listener store with TTL expiry.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
    updates: watch::Sender<Vec<StoreItem>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self { entries: Mutex::new(HashMap::new()), updates, clock }
    }

    fn live_items(entries: &HashMap<String, StoredEntry>, now: DateTime<Utc>) -> Vec<StoreItem> {
        entries
            .values()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.item.clone())
            .collect()
    }
}

#[async_trait]
impl ListenerStore for MemoryStore {
    async fn get_items(&self) -> Result<Vec<StoreItem>, StoreError> {
        let now = self.clock.now_utc();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(Self::live_items(&entries, now))
    }

    async fn push_item(&self, item: StoreItem, _owner: &str) -> Result<String, StoreError> {
        let now = self.clock.now_utc();
        let identifier = item.identifier.clone();
        let expires_at = now + chrono::Duration::seconds(item.ttl as i64);

        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(identifier.clone(), StoredEntry { item, expires_at });
        self.updates.send_replace(Self::live_items(&entries, now));

        Ok(identifier)
    }

    fn subscribe(&self) -> watch::Receiver<Vec<StoreItem>> {
        self.updates.subscribe()
    }
}

/// Adapter between the listener store and the dispatch engine.
pub struct Registry {
    store: Arc<dyn ListenerStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl Registry {
    /// Creates a registry adapter writing items with the given TTL.
    pub fn new(store: Arc<dyn ListenerStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Validates a registration and writes it to the store.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Invalid` for a payload that fails listener
    /// validation and `RegistryError::Store` when the write fails.
    pub async fn register(
        &self,
        registration: Registration,
        address: &str,
    ) -> Result<Listener, RegistryError> {
        let listener =
            Listener::from_registration(registration, address, self.clock.now_utc(), self.ttl)?;

        let data = serde_json::to_value(&listener)
            .map_err(|e| CoreError::InvalidRegistration(e.to_string()))?;
        let item = StoreItem {
            identifier: listener.url.clone(),
            data,
            ttl: self.ttl.as_secs(),
        };
        self.store.push_item(item, &listener.address).await?;

        Ok(listener)
    }

    /// Returns every listener currently known to the store, skipping items
    /// that do not decode.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the store cannot be read.
    pub async fn listeners(&self) -> Result<Vec<Listener>, StoreError> {
        let items = self.store.get_items().await?;
        Ok(items.iter().filter_map(decode_item).collect())
    }

    /// Spawns the task that mirrors store snapshots into the dispatch set.
    ///
    /// The task runs until the store's snapshot channel closes.
    pub fn spawn_updater(&self, wrapper: Arc<SenderWrapper>) -> JoinHandle<()> {
        let mut snapshots = self.store.subscribe();
        tokio::spawn(async move {
            loop {
                let listeners: Vec<Listener> =
                    snapshots.borrow_and_update().iter().filter_map(decode_item).collect();
                wrapper.update(listeners).await;

                if snapshots.changed().await.is_err() {
                    break;
                }
            }
            debug!("listener store subscription closed, updater exiting");
        })
    }
}

/// Decodes one store item into a listener record.
///
/// Items written by other parties may not decode; they are skipped rather
/// than poisoning the whole snapshot.
fn decode_item(item: &StoreItem) -> Option<Listener> {
    match serde_json::from_value::<Listener>(item.data.clone()) {
        Ok(listener) => Some(listener),
        Err(e) => {
            warn!(identifier = %item.identifier, error = %e, "skipping undecodable store item");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use fanout_core::SystemClock;

    use super::*;

    fn item(identifier: &str, ttl: u64) -> StoreItem {
        StoreItem {
            identifier: identifier.to_string(),
            data: serde_json::json!({"marker": identifier}),
            ttl,
        }
    }

    #[tokio::test]
    async fn pushed_items_are_listed() {
        let store = MemoryStore::new(Arc::new(SystemClock::new()));

        store.push_item(item("a", 60), "").await.unwrap();
        store.push_item(item("b", 60), "").await.unwrap();

        let items = store.get_items().await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn push_replaces_same_identifier() {
        let store = MemoryStore::new(Arc::new(SystemClock::new()));

        store.push_item(item("a", 60), "").await.unwrap();
        store.push_item(item("a", 60), "").await.unwrap();

        let items = store.get_items().await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_snapshots() {
        let store = MemoryStore::new(Arc::new(SystemClock::new()));
        let mut snapshots = store.subscribe();

        assert!(snapshots.borrow_and_update().is_empty());

        store.push_item(item("a", 60), "").await.unwrap();
        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow_and_update().len(), 1);
    }

    #[tokio::test]
    async fn undecodable_items_are_skipped() {
        let store: Arc<dyn ListenerStore> = Arc::new(MemoryStore::new(Arc::new(SystemClock::new())));
        store.push_item(item("junk", 60), "").await.unwrap();

        let registry = Registry::new(store, Arc::new(SystemClock::new()), Duration::from_secs(60));
        let listeners = registry.listeners().await.unwrap();
        assert!(listeners.is_empty());
    }
}
