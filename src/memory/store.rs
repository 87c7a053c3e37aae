use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use nanoid::nanoid;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::store::{
    CollectionPath, Direction, Document, DocumentStore, Filter, Query, Subscription,
};

const WATCH_BUFFER_SIZE: usize = 100;

pub enum StoreCommand {
    Insert {
        path: CollectionPath,
        data: Value,
        respond_to: oneshot::Sender<Result<String>>,
    },
    Create {
        path: CollectionPath,
        id: String,
        data: Value,
        respond_to: oneshot::Sender<Result<bool>>,
    },
    Get {
        path: CollectionPath,
        id: String,
        respond_to: oneshot::Sender<Result<Option<Document>>>,
    },
    Update {
        path: CollectionPath,
        id: String,
        patch: Value,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Delete {
        path: CollectionPath,
        id: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Query {
        query: Query,
        respond_to: oneshot::Sender<Result<Vec<Document>>>,
    },
    Watch {
        query: Query,
        respond_to: oneshot::Sender<Result<Subscription>>,
    },
}

struct StoredDoc {
    data: Value,
    // Insertion order, the tie-breaker when order-by keys collide.
    seq: u64,
}

struct WatchEntry {
    query: Query,
    sender: mpsc::Sender<Vec<Document>>,
    cancel: oneshot::Receiver<()>,
}

/// Single-threaded owner of all collections and watchers. Commands are
/// handled one at a time, so find-and-create cannot interleave.
pub struct StoreActor {
    receiver: mpsc::UnboundedReceiver<StoreCommand>,
    collections: HashMap<String, HashMap<String, StoredDoc>>,
    watchers: Vec<WatchEntry>,
    next_seq: u64,
}

impl StoreActor {
    pub fn new() -> (Self, MemoryStore) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let actor = Self {
            receiver,
            collections: HashMap::new(),
            watchers: Vec::new(),
            next_seq: 0,
        };

        (actor, MemoryStore { sender })
    }

    pub async fn run(mut self) {
        info!("in-memory document store started");

        while let Some(command) = self.receiver.recv().await {
            self.handle(command);
        }

        info!("in-memory document store stopped");
    }

    fn handle(&mut self, command: StoreCommand) {
        match command {
            StoreCommand::Insert {
                path,
                data,
                respond_to,
            } => {
                let start = Instant::now();
                let id = nanoid!();
                self.put(&path, &id, data);
                self.notify(&path);
                Metrics::observe_store_op("insert", start.elapsed());
                let _ = respond_to.send(Ok(id));
            }
            StoreCommand::Create {
                path,
                id,
                data,
                respond_to,
            } => {
                let start = Instant::now();
                let exists = self
                    .collections
                    .get(&path.key())
                    .is_some_and(|c| c.contains_key(&id));

                let created = if exists {
                    false
                } else {
                    self.put(&path, &id, data);
                    self.notify(&path);
                    true
                };
                Metrics::observe_store_op("create", start.elapsed());
                let _ = respond_to.send(Ok(created));
            }
            StoreCommand::Get {
                path,
                id,
                respond_to,
            } => {
                let doc = self
                    .collections
                    .get(&path.key())
                    .and_then(|c| c.get(&id))
                    .map(|stored| Document {
                        id: id.clone(),
                        data: stored.data.clone(),
                    });
                let _ = respond_to.send(Ok(doc));
            }
            StoreCommand::Update {
                path,
                id,
                patch,
                respond_to,
            } => {
                let start = Instant::now();
                let result = self.merge(&path, &id, patch);
                if result.is_ok() {
                    self.notify(&path);
                }
                Metrics::observe_store_op("update", start.elapsed());
                let _ = respond_to.send(result);
            }
            StoreCommand::Delete {
                path,
                id,
                respond_to,
            } => {
                let removed = self
                    .collections
                    .get_mut(&path.key())
                    .and_then(|c| c.remove(&id))
                    .is_some();
                // Deleting an absent document is a no-op.
                if removed {
                    self.notify(&path);
                }
                let _ = respond_to.send(Ok(()));
            }
            StoreCommand::Query { query, respond_to } => {
                let docs = Self::run_query(&self.collections, &query);
                let _ = respond_to.send(Ok(docs));
            }
            StoreCommand::Watch { query, respond_to } => {
                let (sender, receiver) = mpsc::channel(WATCH_BUFFER_SIZE);
                let (cancel_tx, cancel_rx) = oneshot::channel();

                // Replay the current result set before any change lands.
                let snapshot = Self::run_query(&self.collections, &query);
                let _ = sender.try_send(snapshot);

                debug!(collection = %query.collection, "watcher registered");
                self.watchers.push(WatchEntry {
                    query,
                    sender,
                    cancel: cancel_rx,
                });

                let _ = respond_to.send(Ok(Subscription::new(receiver, cancel_tx)));
            }
        }
    }

    fn put(&mut self, path: &CollectionPath, id: &str, data: Value) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.collections
            .entry(path.key())
            .or_default()
            .insert(id.to_string(), StoredDoc { data, seq });
    }

    fn merge(&mut self, path: &CollectionPath, id: &str, patch: Value) -> Result<()> {
        let Value::Object(patch) = patch else {
            return Err(Error::Validation("update patch must be an object".to_string()));
        };

        let stored = self
            .collections
            .get_mut(&path.key())
            .and_then(|c| c.get_mut(id))
            .ok_or(Error::NotFound("document"))?;

        let Value::Object(fields) = &mut stored.data else {
            return Err(Error::Validation("stored document is not an object".to_string()));
        };
        for (key, value) in patch {
            fields.insert(key, value);
        }
        Ok(())
    }

    /// Push a fresh snapshot to every live watcher of `path`, dropping
    /// watchers that were cancelled or whose receiver is gone.
    fn notify(&mut self, path: &CollectionPath) {
        let collections = &self.collections;

        self.watchers.retain_mut(|watcher| {
            if watcher.query.collection != *path {
                return true;
            }

            match watcher.cancel.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => {}
                // Explicit stop, or the subscription handle was dropped.
                _ => {
                    debug!(collection = %path, "watcher cancelled");
                    return false;
                }
            }

            let snapshot = Self::run_query(collections, &watcher.query);
            match watcher.sender.try_send(snapshot) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(collection = %path, "watcher buffer full, dropping snapshot");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn run_query(
        collections: &HashMap<String, HashMap<String, StoredDoc>>,
        query: &Query,
    ) -> Vec<Document> {
        let Some(collection) = collections.get(&query.collection.key()) else {
            return Vec::new();
        };

        let mut rows: Vec<(&String, &StoredDoc)> = collection
            .iter()
            .filter(|(_, stored)| query.filters.iter().all(|f| Self::matches(&stored.data, f)))
            .collect();

        if let Some((field, direction)) = &query.order_by {
            rows.sort_by(|(_, a), (_, b)| {
                let ordering = Self::compare_field(&a.data, &b.data, field)
                    .then(a.seq.cmp(&b.seq));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        } else {
            rows.sort_by_key(|(_, stored)| stored.seq);
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        rows.into_iter()
            .map(|(id, stored)| Document {
                id: id.clone(),
                data: stored.data.clone(),
            })
            .collect()
    }

    fn matches(data: &Value, filter: &Filter) -> bool {
        match filter {
            Filter::FieldEq(field, expected) => data.get(field) == Some(expected),
            Filter::ArrayContains(field, expected) => data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(expected)),
        }
    }

    fn compare_field(a: &Value, b: &Value, field: &str) -> std::cmp::Ordering {
        let left = a.get(field);
        let right = b.get(field);
        match (left, right) {
            (Some(l), Some(r)) => {
                if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
                    l.cmp(&r)
                } else if let (Some(l), Some(r)) = (l.as_str(), r.as_str()) {
                    l.cmp(r)
                } else {
                    std::cmp::Ordering::Equal
                }
            }
            _ => std::cmp::Ordering::Equal,
        }
    }
}

/// Cheap cloneable handle; the actor owns the data.
#[derive(Clone)]
pub struct MemoryStore {
    sender: mpsc::UnboundedSender<StoreCommand>,
}

impl MemoryStore {
    /// Spawn the actor on the current runtime and return its handle.
    pub fn spawn() -> Self {
        let (actor, store) = StoreActor::new();
        tokio::spawn(actor.run());
        store
    }

    async fn request<T>(
        &self,
        response: oneshot::Receiver<Result<T>>,
        command: StoreCommand,
    ) -> Result<T> {
        self.sender.send(command).map_err(|_| unavailable())?;
        response.await.map_err(|_| unavailable())?
    }
}

fn unavailable() -> Error {
    Error::Transient("document store unavailable".to_string())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, path: &CollectionPath, data: Value) -> Result<String> {
        let (respond_to, response) = oneshot::channel();
        self.request(
            response,
            StoreCommand::Insert {
                path: path.clone(),
                data,
                respond_to,
            },
        )
        .await
    }

    async fn create(&self, path: &CollectionPath, id: &str, data: Value) -> Result<bool> {
        let (respond_to, response) = oneshot::channel();
        self.request(
            response,
            StoreCommand::Create {
                path: path.clone(),
                id: id.to_string(),
                data,
                respond_to,
            },
        )
        .await
    }

    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>> {
        let (respond_to, response) = oneshot::channel();
        self.request(
            response,
            StoreCommand::Get {
                path: path.clone(),
                id: id.to_string(),
                respond_to,
            },
        )
        .await
    }

    async fn update(&self, path: &CollectionPath, id: &str, patch: Value) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.request(
            response,
            StoreCommand::Update {
                path: path.clone(),
                id: id.to_string(),
                patch,
                respond_to,
            },
        )
        .await
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.request(
            response,
            StoreCommand::Delete {
                path: path.clone(),
                id: id.to_string(),
                respond_to,
            },
        )
        .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let (respond_to, response) = oneshot::channel();
        self.request(
            response,
            StoreCommand::Query {
                query: query.clone(),
                respond_to,
            },
        )
        .await
    }

    async fn watch(&self, query: &Query) -> Result<Subscription> {
        let (respond_to, response) = oneshot::channel();
        self.request(
            response,
            StoreCommand::Watch {
                query: query.clone(),
                respond_to,
            },
        )
        .await
    }
}
