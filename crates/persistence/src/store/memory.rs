//! In-memory document store.
//!
//! Backs local development and tests. Mutations are applied under a single
//! lock and every change is pushed to the collection's live queries while
//! that lock is still held, so subscribers observe snapshots in commit order.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    CollectionSubscription, Document, DocumentStore, FieldMap, FieldUpdate, Snapshot,
    SubscriptionHandle,
};
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_subscriber_count;

#[derive(Default)]
struct Collection {
    /// Documents in insertion order.
    documents: Vec<Document>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Snapshot>>,
}

impl Collection {
    fn snapshot(&self) -> Vec<Document> {
        self.documents.clone()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|d| d.id == id)
    }

    fn publish(&mut self, snapshot: Snapshot) {
        self.subscribers
            .retain(|_, tx| tx.send(snapshot.clone()).is_ok());
    }
}

struct State {
    collections: HashMap<String, Collection>,
    available: bool,
    failures_pending: usize,
    mutations: u64,
}

struct Inner {
    state: Mutex<State>,
    next_subscriber: AtomicU64,
}

/// Document store held entirely in process memory.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    collections: HashMap::new(),
                    available: true,
                    failures_pending: 0,
                    mutations: 0,
                }),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate the backend going offline (or coming back).
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Fail the next `count` operations with `Unavailable`.
    pub fn fail_next_operations(&self, count: usize) {
        self.lock().failures_pending = count;
    }

    /// Number of committed writes (adds and updates).
    pub fn mutation_count(&self) -> u64 {
        self.lock().mutations
    }

    /// Number of live queries currently registered on `collection`.
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.subscribers.len())
            .unwrap_or(0)
    }

    /// Push an error to every live query on `collection`.
    pub fn push_subscription_error(&self, collection: &str, message: &str) {
        let mut state = self.lock();
        if let Some(c) = state.collections.get_mut(collection) {
            c.publish(Err(StoreError::Unavailable(message.to_string())));
        }
    }

    fn check_available(state: &mut State) -> StoreResult<()> {
        if !state.available {
            return Err(StoreError::Unavailable("backend offline".to_string()));
        }
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn release_subscriber(inner: &Weak<Inner>, collection: &str, subscriber: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(c) = state.collections.get_mut(collection) {
            c.subscribers.remove(&subscriber);
            record_subscriber_count(collection, c.subscribers.len());
        }
        tracing::debug!(collection, subscriber, "Live query released");
    }
}

fn array_field<'a>(
    fields: &'a mut FieldMap,
    id: &str,
    field: &str,
) -> StoreResult<&'a mut Vec<Value>> {
    let slot = fields
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match slot {
        Value::Array(items) => Ok(items),
        _ => Err(StoreError::Malformed(format!(
            "{}.{} is not an array",
            id, field
        ))),
    }
}

fn apply_update(fields: &mut FieldMap, id: &str, update: FieldUpdate) -> StoreResult<()> {
    match update {
        FieldUpdate::Set { field, value } => {
            fields.insert(field, value);
        }
        FieldUpdate::ArrayUnionByKey {
            field,
            key,
            element,
        } => {
            let key_value = element.get(&key).cloned().ok_or_else(|| {
                StoreError::Malformed(format!("element for {}.{} has no {}", id, field, key))
            })?;
            let items = array_field(fields, id, &field)?;
            if !items.iter().any(|item| item.get(&key) == Some(&key_value)) {
                items.push(element);
            }
        }
        FieldUpdate::ArrayMergeByKey {
            field,
            key,
            key_value,
            patch,
        } => {
            let items = array_field(fields, id, &field)?;
            let target = items
                .iter_mut()
                .find(|item| item.get(&key) == Some(&key_value))
                .and_then(Value::as_object_mut)
                .ok_or_else(|| StoreError::ElementNotFound {
                    id: id.to_string(),
                    field: field.clone(),
                    key: key.clone(),
                    value: key_value.to_string(),
                })?;
            for (k, v) in patch {
                target.insert(k, v);
            }
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn add_document(&self, collection: &str, fields: FieldMap) -> StoreResult<String> {
        let mut state = self.lock();
        Self::check_available(&mut state)?;

        let id = Uuid::new_v4().simple().to_string();
        state.mutations += 1;
        let c = state.collections.entry(collection.to_string()).or_default();
        c.documents.push(Document::new(id.clone(), fields));
        let snapshot = c.snapshot();
        c.publish(Ok(snapshot));
        Ok(id)
    }

    async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let mut state = self.lock();
        Self::check_available(&mut state)?;

        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.documents.iter().find(|d| d.id == id).cloned()))
    }

    async fn list_documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let mut state = self.lock();
        Self::check_available(&mut state)?;

        Ok(state
            .collections
            .get(collection)
            .map(Collection::snapshot)
            .unwrap_or_default())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        Self::check_available(&mut state)?;

        let not_found = || StoreError::DocumentNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        let c = state.collections.get_mut(collection).ok_or_else(not_found)?;
        let index = c.position(id).ok_or_else(not_found)?;

        // Apply to a copy so a failing update leaves the document untouched.
        let mut fields = c.documents[index].fields.clone();
        for update in updates {
            apply_update(&mut fields, id, update)?;
        }
        c.documents[index].fields = fields;
        let snapshot = c.snapshot();
        c.publish(Ok(snapshot));
        state.mutations += 1;
        Ok(())
    }

    fn subscribe(&self, collection: &str) -> StoreResult<CollectionSubscription> {
        let mut state = self.lock();
        Self::check_available(&mut state)?;

        let subscriber = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let c = state.collections.entry(collection.to_string()).or_default();
        // The receiver is alive, so the initial send cannot fail.
        let _ = tx.send(Ok(c.snapshot()));
        c.subscribers.insert(subscriber, tx);
        record_subscriber_count(collection, c.subscribers.len());
        tracing::debug!(collection, subscriber, "Live query registered");

        let weak = Arc::downgrade(&self.inner);
        let name = collection.to_string();
        let handle = SubscriptionHandle::new(move || {
            InMemoryDocumentStore::release_subscriber(&weak, &name, subscriber);
        });
        Ok(CollectionSubscription::new(rx, handle))
    }
}
