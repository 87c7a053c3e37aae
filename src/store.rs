use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// A persisted record: opaque id plus its JSON field map.
#[derive(Clone, Debug)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Path to a collection. One nesting level is enough for this data model
/// (e.g. `chats/{id}/messages`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPath(Vec<String>);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    pub fn nested(name: &str, doc_id: &str, sub: &str) -> Self {
        Self(vec![name.to_string(), doc_id.to_string(), sub.to_string()])
    }

    pub fn key(&self) -> String {
        self.0.join("/")
    }

    /// Top-level collection name, used as a low-cardinality metrics label.
    pub fn root_name(&self) -> &str {
        &self.0[0]
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Clone, Debug)]
pub enum Filter {
    FieldEq(String, Value),
    ArrayContains(String, Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(path: CollectionPath) -> Self {
        Self {
            collection: path,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Live handle on a standing query. The current result set is replayed on
/// subscribe and re-delivered in full after every change; there is no
/// incremental diff. `stop()` (or dropping the handle) cancels delivery.
pub struct Subscription {
    receiver: mpsc::Receiver<Vec<Document>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(
        receiver: mpsc::Receiver<Vec<Document>>,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            receiver,
            cancel: Some(cancel),
        }
    }

    /// Next full snapshot, or `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<Vec<Document>> {
        self.receiver.recv().await
    }

    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// The document-database collaborator. Implementations own persistence,
/// fan-out and ordering; this crate only consumes the contract.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert with a store-assigned id; returns the new id.
    async fn insert(&self, path: &CollectionPath, data: Value) -> Result<String>;

    /// Put-if-absent under a caller-chosen id. Returns `true` when the
    /// document was created, `false` when one already existed (the
    /// existing document is left untouched).
    async fn create(&self, path: &CollectionPath, id: &str, data: Value) -> Result<bool>;

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>>;

    /// Merge the top-level fields of `patch` into an existing document.
    async fn update(&self, path: &CollectionPath, id: &str, patch: Value) -> Result<()>;

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<()>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    async fn watch(&self, query: &Query) -> Result<Subscription>;
}
