use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{error, instrument, warn};

use super::model::{DocumentKind, DocumentRecord};
use super::store::{QueryOrder, RecordStore, StoreError};

pub const UNKNOWN_DOCUMENT_TYPE: &str = "unknown";
pub const RECENT_DOCUMENTS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    pub total_documents: usize,
    pub generated_documents: usize,
    pub scanned_documents: usize,
    pub documents_by_type: BTreeMap<String, usize>,
    pub recent_documents: Vec<DocumentRecord>,
}

/// Newest first. Stable, so equal timestamps keep fetch order.
pub fn sort_newest_first(records: &mut [DocumentRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Every record owned by `user_id`, newest first.
///
/// Asks the store for `created_at DESC` first; if that is rejected, repeats
/// the filter without ordering. The result is sorted client-side either way.
pub async fn fetch_user_records(
    store: &dyn RecordStore,
    user_id: &str,
) -> Result<Vec<DocumentRecord>, StoreError> {
    let mut records = match store.find_by_user(user_id, QueryOrder::CreatedAtDesc).await {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "ordered query failed, retrying without ordering");
            store.find_by_user(user_id, QueryOrder::Unordered).await?
        }
    };
    sort_newest_first(&mut records);
    Ok(records)
}

/// Summarizes records that are already sorted newest first.
pub fn aggregate(records: Vec<DocumentRecord>) -> DocumentStats {
    let mut stats = DocumentStats {
        total_documents: records.len(),
        ..Default::default()
    };
    for record in &records {
        match record.kind() {
            DocumentKind::Generated => {
                stats.generated_documents += 1;
                let key = record.document_type().unwrap_or(UNKNOWN_DOCUMENT_TYPE);
                *stats.documents_by_type.entry(key.to_string()).or_default() += 1;
            }
            DocumentKind::Scanned => stats.scanned_documents += 1,
        }
    }
    stats.recent_documents = records.into_iter().take(RECENT_DOCUMENTS).collect();
    stats
}

/// Never fails: an unreadable store yields zeroed stats.
#[instrument(skip(store))]
pub async fn user_document_stats(store: &dyn RecordStore, user_id: &str) -> DocumentStats {
    match fetch_user_records(store, user_id).await {
        Ok(records) => aggregate(records),
        Err(e) => {
            error!(error = %e, "fetching document stats failed");
            if matches!(e, StoreError::PermissionDenied(_)) {
                error!("permission denied; check the store's access rules for document_records");
            }
            DocumentStats::default()
        }
    }
}

/// The `limit` newest Scanned records. Filters the full set before truncating.
#[instrument(skip(store))]
pub async fn recent_scanned_documents(
    store: &dyn RecordStore,
    user_id: &str,
    limit: usize,
) -> Vec<DocumentRecord> {
    match fetch_user_records(store, user_id).await {
        Ok(records) => records
            .into_iter()
            .filter(|r| r.kind() == DocumentKind::Scanned)
            .take(limit)
            .collect(),
        Err(e) => {
            error!(error = %e, "fetching recent scanned documents failed");
            Vec::new()
        }
    }
}
