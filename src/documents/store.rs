use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};

use super::model::{DocumentRecord, NewRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("the query requires an index that does not exist")]
    IndexMissing,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Failures the ordered paths recover from by dropping the ordering clause.
    pub fn is_index_or_permission(&self) -> bool {
        matches!(self, StoreError::IndexMissing | StoreError::PermissionDenied(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("42501") => {
                StoreError::PermissionDenied(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Ordering requested from the store for a user-filtered read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    CreatedAtDesc,
    Unordered,
}

/// A change to the records of the subscribed user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub user_id: String,
}

/// A live change feed for one user. Dropping it releases the listener.
pub struct Subscription {
    order: QueryOrder,
    events: mpsc::Receiver<Result<ChangeEvent, StoreError>>,
    worker: JoinHandle<()>,
}

impl Subscription {
    pub fn new(
        order: QueryOrder,
        events: mpsc::Receiver<Result<ChangeEvent, StoreError>>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            order,
            events,
            worker,
        }
    }

    pub fn order(&self) -> QueryOrder {
        self.order
    }

    /// `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Result<ChangeEvent, StoreError>> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a record; the store assigns `id` and `created_at`.
    async fn insert(&self, record: NewRecord) -> Result<DocumentRecord, StoreError>;

    /// All records owned by `user_id`.
    async fn find_by_user(
        &self,
        user_id: &str,
        order: QueryOrder,
    ) -> Result<Vec<DocumentRecord>, StoreError>;

    async fn subscribe(&self, user_id: &str, order: QueryOrder)
        -> Result<Subscription, StoreError>;
}
