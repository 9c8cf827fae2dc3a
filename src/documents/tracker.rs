use std::sync::Arc;

use tracing::{error, info, instrument};

use super::model::{Metadata, NewRecord};
use super::store::RecordStore;
use super::titles::normalize_document_type;

/// Best-effort activity log. Persistence failures are logged here and never
/// reach the caller.
#[derive(Clone)]
pub struct RecordTracker {
    store: Arc<dyn RecordStore>,
}

impl RecordTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, metadata))]
    pub async fn record_generation(
        &self,
        user_id: &str,
        document_type: &str,
        title: &str,
        language: &str,
        metadata: Option<Metadata>,
    ) {
        let language = match language.trim() {
            "" => "en",
            l => l,
        };
        let record = NewRecord::generated(
            user_id,
            normalize_document_type(document_type),
            title,
            language,
            metadata.unwrap_or_default(),
        );
        match self.store.insert(record).await {
            Ok(saved) => info!(record_id = %saved.id, "document generation saved"),
            Err(e) => error!(error = %e, "saving document generation failed"),
        }
    }

    #[instrument(skip(self))]
    pub async fn record_scanning(
        &self,
        user_id: &str,
        title: &str,
        simplified_language: Option<&str>,
    ) {
        let simplified_language = simplified_language
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("auto"))
            .map(str::to_string);
        let record = NewRecord::scanned(user_id, title, simplified_language);
        match self.store.insert(record).await {
            Ok(saved) => info!(record_id = %saved.id, "document scanning saved"),
            Err(e) => error!(error = %e, "saving document scanning failed"),
        }
    }
}
