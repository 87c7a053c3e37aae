use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};
use crate::live::Live;
use crate::metrics::Metrics;
use crate::profile;
use crate::session::SessionContext;
use crate::store::{CollectionPath, Direction, DocumentStore, Filter, Query};

pub const CALLS: &str = "calls";

pub type CallStream = Live<Call>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Incoming,
    Outgoing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Completed,
    Missed,
    Declined,
}

/// The recents list filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallFilter {
    All,
    Missed,
}

/// One entry in the call log. Media/transport for the call itself is a
/// different collaborator entirely; we only record that it happened.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Call {
    #[serde(skip)]
    pub id: String,
    pub user_ids: Vec<String>,
    pub caller_id: String,
    pub receiver_id: String,
    pub receiver_name: String,
    pub receiver_avatar: Option<String>,
    pub kind: CallKind,
    pub status: CallStatus,
    pub duration_secs: Option<u32>,
    pub created_at: i64,
}

impl Call {
    pub fn from_document(doc: crate::store::Document) -> Result<Self> {
        let mut call: Call = serde_json::from_value(doc.data)?;
        call.id = doc.id;
        Ok(call)
    }
}

#[derive(Clone)]
pub struct CallService {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
}

impl CallService {
    pub fn new(store: Arc<dyn DocumentStore>, session: SessionContext) -> Self {
        Self { store, session }
    }

    pub async fn record_call(
        &self,
        receiver_id: &str,
        kind: CallKind,
        status: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<Call> {
        let user = self.session.current_user().await?;

        if receiver_id.trim().is_empty() {
            return Err(Error::Validation("receiver id is empty".to_string()));
        }

        let (receiver_name, receiver_avatar) =
            profile::display_identity(self.store.as_ref(), receiver_id).await;

        let call = Call {
            id: String::new(),
            user_ids: vec![user.uid.clone(), receiver_id.to_string()],
            caller_id: user.uid.clone(),
            receiver_id: receiver_id.to_string(),
            receiver_name,
            receiver_avatar,
            kind,
            status,
            duration_secs,
            created_at: Utc::now().timestamp_millis(),
        };

        let path = CollectionPath::root(CALLS);
        let id = self
            .store
            .insert(&path, serde_json::to_value(&call)?)
            .await?;

        Metrics::record_created(CALLS);
        info!(call = %id, receiver = receiver_id, "call recorded");

        Ok(Call { id, ..call })
    }

    /// Recents for the current user, newest first. `Missed` narrows the
    /// standing query server-side rather than filtering snapshots here.
    pub async fn watch_calls(&self, filter: CallFilter) -> Result<CallStream> {
        let user = self.session.current_user().await?;

        let mut query = Query::collection(CollectionPath::root(CALLS))
            .filter(Filter::ArrayContains(
                "user_ids".to_string(),
                json!(user.uid),
            ))
            .order_by("created_at", Direction::Descending);

        if filter == CallFilter::Missed {
            query = query.filter(Filter::FieldEq("status".to_string(), json!("missed")));
        }

        Live::open(self.store.clone(), query, Call::from_document).await
    }
}
