//! Document store contract.
//!
//! The managed backend exposes collections of schemaless documents, each an
//! id plus a JSON field map, with live collection queries. Everything the
//! client persists goes through [`DocumentStore`].

mod memory;

pub use memory::InMemoryDocumentStore;

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::error::StoreResult;

/// Field map of a single document.
pub type FieldMap = serde_json::Map<String, Value>;

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: FieldMap,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Returns the string value of `field`, if present and a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// A single field mutation applied by [`DocumentStore::update_document`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Overwrite the whole field.
    Set { field: String, value: Value },

    /// Append `element` unless an element with the same `key` value exists.
    ArrayUnionByKey {
        field: String,
        key: String,
        element: Value,
    },

    /// Shallow-merge `patch` into the object element whose `key` equals
    /// `key_value`. Fails with `ElementNotFound` if there is none.
    ArrayMergeByKey {
        field: String,
        key: String,
        key_value: Value,
        patch: FieldMap,
    },
}

/// One delivery from a live collection query: the full document list, or
/// the error that interrupted it.
pub type Snapshot = StoreResult<Vec<Document>>;

/// Document store with live collection subscriptions.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Add a document with a store-generated id and return that id.
    async fn add_document(&self, collection: &str, fields: FieldMap) -> StoreResult<String>;

    /// Fetch one document.
    async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Fetch every document in the collection.
    async fn list_documents(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Apply all `updates` to one document atomically.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> StoreResult<()>;

    /// Start a live query over the collection.
    ///
    /// The current snapshot is delivered first, then one full snapshot per
    /// change, in the order the store applied the changes.
    fn subscribe(&self, collection: &str) -> StoreResult<CollectionSubscription>;
}

/// Releases a live query. Cloned handles share the same registration, and
/// the release runs at most once however many times it is requested.
#[derive(Clone)]
pub struct SubscriptionHandle {
    release: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl SubscriptionHandle {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Arc::new(Mutex::new(Some(Box::new(release)))),
        }
    }

    /// Release the registration. Returns true only for the call that did it.
    pub fn unsubscribe(&self) -> bool {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Receiving side of a live collection query.
///
/// Dropping it releases the registration.
#[derive(Debug)]
pub struct CollectionSubscription {
    receiver: mpsc::UnboundedReceiver<Snapshot>,
    handle: SubscriptionHandle,
}

impl CollectionSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Snapshot>, handle: SubscriptionHandle) -> Self {
        Self { receiver, handle }
    }

    /// Wait for the next snapshot. `None` once the query is released.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if !self.handle.is_active() {
            return None;
        }
        self.receiver.recv().await
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn unsubscribe(&self) -> bool {
        self.handle.unsubscribe()
    }
}

impl Drop for CollectionSubscription {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}
