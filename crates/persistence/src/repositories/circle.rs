//! Circle repository for document store operations.

use domain::models::{Circle, Member};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::entities::{CircleDocument, CIRCLES_COLLECTION, MEMBERS_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::metrics::StoreTimer;
use crate::store::{CollectionSubscription, DocumentStore, FieldMap, FieldUpdate, SubscriptionHandle};

/// Repository for circle documents.
#[derive(Clone)]
pub struct CircleRepository {
    store: Arc<dyn DocumentStore>,
}

impl CircleRepository {
    /// Creates a new CircleRepository over the given store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create a new circle document and return its id.
    pub async fn create_circle(&self, name: &str, code: &str, creator: Member) -> StoreResult<String> {
        let timer = StoreTimer::new("create_circle");
        let fields = CircleDocument::new(name, code, creator).into_fields()?;
        let result = self.store.add_document(CIRCLES_COLLECTION, fields).await;
        timer.record();
        result
    }

    /// Find a circle by id.
    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Circle>> {
        let timer = StoreTimer::new("find_circle_by_id");
        let result = self.store.get_document(CIRCLES_COLLECTION, id).await;
        timer.record();
        result?.as_ref().map(Circle::try_from).transpose()
    }

    /// Find the id of the circle whose code equals `code` exactly.
    ///
    /// Scans every circle document; only the `code` field is inspected, so a
    /// document that is otherwise malformed can still match.
    pub async fn find_id_by_code(&self, code: &str) -> StoreResult<Option<String>> {
        let timer = StoreTimer::new("find_circle_by_code");
        let result = self.store.list_documents(CIRCLES_COLLECTION).await;
        timer.record();
        Ok(result?
            .into_iter()
            .find(|doc| doc.str_field("code") == Some(code))
            .map(|doc| doc.id))
    }

    /// Check if any circle already uses `code`.
    pub async fn code_exists(&self, code: &str) -> StoreResult<bool> {
        Ok(self.find_id_by_code(code).await?.is_some())
    }

    /// Generate a code not used by any circle at the time of the check.
    ///
    /// Best-effort only: two concurrent callers can still draw the same code
    /// between the check and the write.
    pub async fn generate_unique_code<F>(&self, generator: F, max_attempts: u32) -> StoreResult<String>
    where
        F: Fn() -> String,
    {
        let mut code = generator();
        let mut attempts = 1;

        while self.code_exists(&code).await? {
            if attempts >= max_attempts {
                return Err(StoreError::Unavailable(
                    "Could not generate unique circle code".to_string(),
                ));
            }
            code = generator();
            attempts += 1;
        }

        Ok(code)
    }

    /// Add a member entry unless one with the same id is already present.
    pub async fn add_member(&self, circle_id: &str, member: &Member) -> StoreResult<()> {
        let timer = StoreTimer::new("add_circle_member");
        let element = serde_json::to_value(member)?;
        let result = self
            .store
            .update_document(
                CIRCLES_COLLECTION,
                circle_id,
                vec![FieldUpdate::ArrayUnionByKey {
                    field: MEMBERS_FIELD.to_string(),
                    key: Member::KEY_FIELD.to_string(),
                    element,
                }],
            )
            .await;
        timer.record();
        result
    }

    /// Merge `patch` into the entry of `member_id` only.
    pub async fn merge_member_fields(
        &self,
        circle_id: &str,
        member_id: Uuid,
        patch: FieldMap,
    ) -> StoreResult<()> {
        let timer = StoreTimer::new("merge_circle_member");
        let result = self
            .store
            .update_document(
                CIRCLES_COLLECTION,
                circle_id,
                vec![FieldUpdate::ArrayMergeByKey {
                    field: MEMBERS_FIELD.to_string(),
                    key: Member::KEY_FIELD.to_string(),
                    key_value: Value::String(member_id.to_string()),
                    patch,
                }],
            )
            .await;
        timer.record();
        result
    }

    /// Read the raw member entries of a circle, exactly as stored.
    pub async fn fetch_member_entries(&self, circle_id: &str) -> StoreResult<Option<Vec<Value>>> {
        let timer = StoreTimer::new("fetch_circle_members");
        let result = self.store.get_document(CIRCLES_COLLECTION, circle_id).await;
        timer.record();
        let Some(doc) = result? else {
            return Ok(None);
        };
        match doc.fields.get(MEMBERS_FIELD) {
            None => Ok(Some(Vec::new())),
            Some(Value::Array(items)) => Ok(Some(items.clone())),
            Some(_) => Err(StoreError::Malformed(format!(
                "{}.{} is not an array",
                circle_id, MEMBERS_FIELD
            ))),
        }
    }

    /// Overwrite the whole member list.
    pub async fn overwrite_members(&self, circle_id: &str, members: Vec<Value>) -> StoreResult<()> {
        let timer = StoreTimer::new("overwrite_circle_members");
        let result = self
            .store
            .update_document(
                CIRCLES_COLLECTION,
                circle_id,
                vec![FieldUpdate::Set {
                    field: MEMBERS_FIELD.to_string(),
                    value: Value::Array(members),
                }],
            )
            .await;
        timer.record();
        result
    }

    /// Start a live query over all circles.
    pub fn subscribe(&self) -> StoreResult<CircleFeed> {
        let inner = self.store.subscribe(CIRCLES_COLLECTION)?;
        Ok(CircleFeed { inner })
    }
}

/// Live query over the circles collection, decoded into [`Circle`]s.
#[derive(Debug)]
pub struct CircleFeed {
    inner: CollectionSubscription,
}

impl CircleFeed {
    /// Wait for the next full circle list. `None` once released.
    ///
    /// Documents that fail to decode are skipped with a warning.
    pub async fn next(&mut self) -> Option<StoreResult<Vec<Circle>>> {
        let snapshot = self.inner.next().await?;
        Some(snapshot.map(|docs| {
            docs.iter()
                .filter_map(|doc| match Circle::try_from(doc) {
                    Ok(circle) => Some(circle),
                    Err(e) => {
                        warn!(circle_id = %doc.id, error = %e, "Skipping malformed circle document");
                        None
                    }
                })
                .collect()
        }))
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.inner.handle()
    }
}
