use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{postgres::PgListener, PgPool};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::model::{DocumentKind, DocumentRecord, NewRecord, RecordDetails};
use super::repo_types::DocumentRow;
use super::store::{ChangeEvent, QueryOrder, RecordStore, StoreError, Subscription};

pub const NOTIFY_CHANNEL: &str = "document_records";
pub const ORDERED_INDEX: &str = "document_records_user_created_idx";

/// Records backed by the `document_records` table; change events via LISTEN/NOTIFY.
///
/// All subscriptions share one `PgListener` connection. Each subscription
/// only forwards notifications whose payload is its user id.
#[derive(Clone)]
pub struct PgRecordStore {
    db: PgPool,
    require_ordered_index: bool,
    hub: Arc<Mutex<Option<ListenerHub>>>,
}

#[derive(Debug, Clone)]
enum Notice {
    Changed(String),
    Failed(String),
}

struct ListenerHub {
    notices: broadcast::Sender<Notice>,
    worker: JoinHandle<()>,
}

impl ListenerHub {
    async fn start(db: &PgPool) -> Result<Self, StoreError> {
        let mut listener = PgListener::connect_with(db).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let (notices, _) = broadcast::channel(256);
        let tx = notices.clone();
        let worker = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let _ = tx.send(Notice::Changed(notification.payload().to_string()));
                    }
                    Err(e) => {
                        warn!(error = %e, "document_records listener failed");
                        let _ = tx.send(Notice::Failed(e.to_string()));
                        break;
                    }
                }
            }
        });
        info!(channel = NOTIFY_CHANNEL, "document listener connected");
        Ok(Self { notices, worker })
    }
}

impl Drop for ListenerHub {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Forwards one user's notifications until the receiver goes away or the
/// shared listener fails.
async fn forward_user_notices(
    mut notices: broadcast::Receiver<Notice>,
    user_id: String,
    tx: mpsc::Sender<Result<ChangeEvent, StoreError>>,
) {
    loop {
        let event = match notices.recv().await {
            Ok(Notice::Changed(payload)) if payload == user_id => {
                debug!(user_id = %user_id, "document_records notification");
                Ok(ChangeEvent {
                    user_id: user_id.clone(),
                })
            }
            Ok(Notice::Changed(_)) => continue,
            // Skipped notifications may have been ours.
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(user_id = %user_id, skipped, "document listener lagged");
                Ok(ChangeEvent {
                    user_id: user_id.clone(),
                })
            }
            Ok(Notice::Failed(reason)) => Err(StoreError::Unavailable(reason)),
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let failed = event.is_err();
        if tx.send(event).await.is_err() || failed {
            break;
        }
    }
}

impl PgRecordStore {
    pub fn new(db: PgPool, require_ordered_index: bool) -> Self {
        Self {
            db,
            require_ordered_index,
            hub: Arc::new(Mutex::new(None)),
        }
    }

    async fn ensure_ordered_index(&self) -> Result<(), StoreError> {
        if !self.require_ordered_index {
            return Ok(());
        }
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_indexes
                 WHERE schemaname = current_schema()
                   AND tablename = 'document_records'
                   AND indexname = $1
            )
            "#,
        )
        .bind(ORDERED_INDEX)
        .fetch_one(&self.db)
        .await?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::IndexMissing)
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<DocumentRecord, StoreError> {
        let (kind, document_type, language, simplified_language, metadata) = match &record.details
        {
            RecordDetails::Generated {
                document_type,
                language,
                metadata,
            } => (
                DocumentKind::Generated.as_str(),
                document_type.clone(),
                Some(language.clone()),
                None,
                metadata.clone(),
            ),
            RecordDetails::Scanned {
                simplified_language,
            } => (
                DocumentKind::Scanned.as_str(),
                None,
                None,
                simplified_language.clone(),
                Default::default(),
            ),
        };

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO document_records
                (user_id, kind, document_type, title, language, simplified_language, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, kind, document_type, title, language,
                      simplified_language, metadata, created_at
            "#,
        )
        .bind(&record.user_id)
        .bind(kind)
        .bind(document_type)
        .bind(&record.title)
        .bind(language)
        .bind(simplified_language)
        .bind(sqlx::types::Json(metadata))
        .fetch_one(&self.db)
        .await?;

        DocumentRecord::try_from(row)
    }

    async fn find_by_user(
        &self,
        user_id: &str,
        order: QueryOrder,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let sql = match order {
            QueryOrder::CreatedAtDesc => {
                self.ensure_ordered_index().await?;
                r#"
                SELECT id, user_id, kind, document_type, title, language,
                       simplified_language, metadata, created_at
                  FROM document_records
                 WHERE user_id = $1
                 ORDER BY created_at DESC
                "#
            }
            QueryOrder::Unordered => {
                r#"
                SELECT id, user_id, kind, document_type, title, language,
                       simplified_language, metadata, created_at
                  FROM document_records
                 WHERE user_id = $1
                "#
            }
        };

        let rows = sqlx::query_as::<_, DocumentRow>(sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        rows.into_iter().map(DocumentRecord::try_from).collect()
    }

    async fn subscribe(
        &self,
        user_id: &str,
        order: QueryOrder,
    ) -> Result<Subscription, StoreError> {
        if order == QueryOrder::CreatedAtDesc {
            self.ensure_ordered_index().await?;
        }

        let notices = {
            let mut hub = self.hub.lock().await;
            let active = match hub.take() {
                Some(running) if !running.worker.is_finished() => running,
                _ => ListenerHub::start(&self.db).await?,
            };
            let notices = active.notices.subscribe();
            *hub = Some(active);
            notices
        };

        let (tx, rx) = mpsc::channel(16);
        let worker = tokio::spawn(forward_user_notices(notices, user_id.to_string(), tx));

        Ok(Subscription::new(order, rx, worker))
    }
}
