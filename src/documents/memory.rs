use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::model::{DocumentRecord, NewRecord};
use super::store::{ChangeEvent, QueryOrder, RecordStore, StoreError, Subscription};

/// Failure categories the memory store can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    IndexMissing,
    PermissionDenied,
    Unavailable,
}

impl Fault {
    fn to_error(self) -> StoreError {
        match self {
            Fault::IndexMissing => StoreError::IndexMissing,
            Fault::PermissionDenied => StoreError::PermissionDenied("rules reject query".into()),
            Fault::Unavailable => StoreError::Unavailable("memory store offline".into()),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    insert: Option<Fault>,
    ordered_query: Option<Fault>,
    unordered_query: Option<Fault>,
    ordered_subscribe: Option<Fault>,
    ordered_stream: Option<Fault>,
    unordered_subscribe: Option<Fault>,
    query_delays: VecDeque<Duration>,
}

#[derive(Default)]
struct Inner {
    records: Vec<DocumentRecord>,
    last_created_at: Option<OffsetDateTime>,
    faults: Faults,
    query_calls: usize,
}

/// In-process store used for development and tests. Queries snapshot the
/// records at call time; an unordered query returns them in arrival order.
#[derive(Clone)]
pub struct MemoryRecordStore {
    inner: Arc<Mutex<Inner>>,
    changes: broadcast::Sender<String>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning only happens if a test panicked while holding the lock.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn fail_inserts(&self, fault: Option<Fault>) {
        self.lock().faults.insert = fault;
    }

    pub fn fail_ordered_queries(&self, fault: Option<Fault>) {
        self.lock().faults.ordered_query = fault;
    }

    pub fn fail_unordered_queries(&self, fault: Option<Fault>) {
        self.lock().faults.unordered_query = fault;
    }

    /// Rejects ordered subscriptions at setup time.
    pub fn fail_ordered_subscriptions(&self, fault: Option<Fault>) {
        self.lock().faults.ordered_subscribe = fault;
    }

    /// Accepts ordered subscriptions but delivers `fault` as their first event.
    pub fn break_ordered_streams(&self, fault: Option<Fault>) {
        self.lock().faults.ordered_stream = fault;
    }

    pub fn fail_unordered_subscriptions(&self, fault: Option<Fault>) {
        self.lock().faults.unordered_subscribe = fault;
    }

    /// The next `find_by_user` calls resolve after these delays, in call order.
    pub fn delay_queries(&self, delays: impl IntoIterator<Item = Duration>) {
        self.lock().faults.query_delays.extend(delays);
    }

    pub fn query_calls(&self) -> usize {
        self.lock().query_calls
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a record with an explicit timestamp, bypassing faults and notifications.
    pub fn seed(&self, record: NewRecord, created_at: OffsetDateTime) -> DocumentRecord {
        let record = record.into_record(Uuid::new_v4(), created_at);
        self.lock().records.push(record.clone());
        record
    }

    /// Strictly increasing per writer; equal wall-clock reads get nudged forward.
    fn next_timestamp(inner: &mut Inner) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let ts = match inner.last_created_at {
            Some(last) if now <= last => last + time::Duration::microseconds(1),
            _ => now,
        };
        inner.last_created_at = Some(ts);
        ts
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<DocumentRecord, StoreError> {
        let stored = {
            let mut inner = self.lock();
            if let Some(fault) = inner.faults.insert {
                return Err(fault.to_error());
            }
            let created_at = Self::next_timestamp(&mut inner);
            let stored = record.into_record(Uuid::new_v4(), created_at);
            inner.records.push(stored.clone());
            stored
        };
        let _ = self.changes.send(stored.user_id.clone());
        Ok(stored)
    }

    async fn find_by_user(
        &self,
        user_id: &str,
        order: QueryOrder,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let (result, delay) = {
            let mut inner = self.lock();
            inner.query_calls += 1;
            let delay = inner.faults.query_delays.pop_front();
            let fault = match order {
                QueryOrder::CreatedAtDesc => inner.faults.ordered_query,
                QueryOrder::Unordered => inner.faults.unordered_query,
            };
            let result = match fault {
                Some(fault) => Err(fault.to_error()),
                None => {
                    let mut records: Vec<DocumentRecord> = inner
                        .records
                        .iter()
                        .filter(|r| r.user_id == user_id)
                        .cloned()
                        .collect();
                    if order == QueryOrder::CreatedAtDesc {
                        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                    }
                    Ok(records)
                }
            };
            (result, delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn subscribe(
        &self,
        user_id: &str,
        order: QueryOrder,
    ) -> Result<Subscription, StoreError> {
        let (setup_fault, stream_fault) = {
            let inner = self.lock();
            match order {
                QueryOrder::CreatedAtDesc => {
                    (inner.faults.ordered_subscribe, inner.faults.ordered_stream)
                }
                QueryOrder::Unordered => (inner.faults.unordered_subscribe, None),
            }
        };
        if let Some(fault) = setup_fault {
            return Err(fault.to_error());
        }

        let (tx, rx) = mpsc::channel(16);
        let mut changes = self.changes.subscribe();
        let user_id = user_id.to_string();
        let worker = tokio::spawn(async move {
            if let Some(fault) = stream_fault {
                let _ = tx.send(Err(fault.to_error())).await;
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(changed) if changed == user_id => {
                        let event = ChangeEvent {
                            user_id: user_id.clone(),
                        };
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    // Missed notifications still mean "something changed".
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        let event = ChangeEvent {
                            user_id: user_id.clone(),
                        };
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(order, rx, worker))
    }
}
