use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{DocumentKind, DocumentRecord, Metadata, RecordDetails};
use super::store::StoreError;

/// A row of `document_records`.
#[derive(Debug, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub user_id: String,
    pub kind: String,
    pub document_type: Option<String>,
    pub title: String,
    pub language: Option<String>,
    pub simplified_language: Option<String>,
    pub metadata: sqlx::types::Json<Metadata>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = StoreError;

    fn try_from(r: DocumentRow) -> Result<Self, Self::Error> {
        let details = match DocumentKind::parse(&r.kind) {
            Some(DocumentKind::Generated) => RecordDetails::Generated {
                document_type: r.document_type,
                language: r.language.unwrap_or_else(|| "en".into()),
                metadata: r.metadata.0,
            },
            Some(DocumentKind::Scanned) => RecordDetails::Scanned {
                simplified_language: r.simplified_language,
            },
            None => {
                return Err(StoreError::Corrupt {
                    id: r.id.to_string(),
                    reason: format!("unknown kind {:?}", r.kind),
                })
            }
        };
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            created_at: r.created_at,
            details,
        })
    }
}
