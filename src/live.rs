use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::metrics::Metrics;
use crate::store::{Document, DocumentStore, Query, Subscription};

const MAX_RESUBSCRIBE_ATTEMPTS: u32 = 3;

/// Cancellable live view over a standing query: replays the current
/// result set on open, then re-delivers the full decoded set after every
/// change. If the underlying channel dies while the view is still wanted,
/// it resubscribes with bounded backoff before giving up.
pub struct Live<T> {
    store: Arc<dyn DocumentStore>,
    query: Query,
    subscription: Subscription,
    decode: fn(Document) -> Result<T>,
    stopped: bool,
}

impl<T> Live<T> {
    pub(crate) async fn open(
        store: Arc<dyn DocumentStore>,
        query: Query,
        decode: fn(Document) -> Result<T>,
    ) -> Result<Self> {
        let subscription = store.watch(&query).await?;
        Metrics::subscription_opened();

        Ok(Self {
            store,
            query,
            subscription,
            decode,
            stopped: false,
        })
    }

    /// Next full snapshot, or `None` once the view is stopped or the
    /// subscription is gone for good.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        loop {
            if self.stopped {
                return None;
            }

            match self.subscription.next().await {
                Some(docs) => {
                    Metrics::snapshot_delivered(self.query.collection.root_name());

                    let mut items = Vec::with_capacity(docs.len());
                    for doc in docs {
                        match (self.decode)(doc) {
                            Ok(item) => items.push(item),
                            // A single bad record must not kill the view.
                            Err(e) => warn!(
                                collection = %self.query.collection,
                                "skipping undecodable document: {}",
                                e
                            ),
                        }
                    }
                    return Some(items);
                }
                None if self.stopped => return None,
                None => {
                    if !self.resubscribe().await {
                        return None;
                    }
                }
            }
        }
    }

    /// Stop delivery. Changes applied after this call never reach the
    /// observer, even if the backend is still producing snapshots.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.subscription.stop();
    }

    async fn resubscribe(&mut self) -> bool {
        let mut attempts = 0;

        while attempts < MAX_RESUBSCRIBE_ATTEMPTS {
            attempts += 1;
            let delay = Duration::from_millis(100 * attempts as u64);
            warn!(
                collection = %self.query.collection,
                "live query channel lost, resubscribing (attempt {}/{}) in {:?}",
                attempts,
                MAX_RESUBSCRIBE_ATTEMPTS,
                delay
            );
            sleep(delay).await;

            match self.store.watch(&self.query).await {
                Ok(subscription) => {
                    self.subscription = subscription;
                    debug!(collection = %self.query.collection, "resubscribed");
                    return true;
                }
                Err(e) => warn!(
                    collection = %self.query.collection,
                    "resubscribe failed: {}",
                    e
                ),
            }
        }

        error!(
            collection = %self.query.collection,
            "live query abandoned after {} resubscribe attempts",
            MAX_RESUBSCRIBE_ATTEMPTS
        );
        false
    }
}

impl<T> Drop for Live<T> {
    fn drop(&mut self) {
        self.subscription.stop();
        Metrics::subscription_closed();
    }
}
