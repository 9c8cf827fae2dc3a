use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Free-form, write-once auxiliary fields (party name, effective date, ...).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Generated/Scanned discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Generated,
    Scanned,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Generated => "generated",
            DocumentKind::Scanned => "scanned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generated" => Some(DocumentKind::Generated),
            "scanned" => Some(DocumentKind::Scanned),
            _ => None,
        }
    }
}

/// Per-kind fields. Each variant carries only what is valid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordDetails {
    #[serde(rename_all = "camelCase")]
    Generated {
        document_type: Option<String>,
        language: String,
        #[serde(default)]
        metadata: Metadata,
    },
    #[serde(rename_all = "camelCase")]
    Scanned { simplified_language: Option<String> },
}

impl RecordDetails {
    pub fn kind(&self) -> DocumentKind {
        match self {
            RecordDetails::Generated { .. } => DocumentKind::Generated,
            RecordDetails::Scanned { .. } => DocumentKind::Scanned,
        }
    }
}

/// One logged user action. Immutable once the store has created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub details: RecordDetails,
}

impl DocumentRecord {
    pub fn kind(&self) -> DocumentKind {
        self.details.kind()
    }

    pub fn document_type(&self) -> Option<&str> {
        match &self.details {
            RecordDetails::Generated { document_type, .. } => document_type.as_deref(),
            RecordDetails::Scanned { .. } => None,
        }
    }
}

/// A record as submitted for creation. `id` and `created_at` come from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub user_id: String,
    pub title: String,
    pub details: RecordDetails,
}

impl NewRecord {
    pub fn generated(
        user_id: impl Into<String>,
        document_type: Option<String>,
        title: impl Into<String>,
        language: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            details: RecordDetails::Generated {
                document_type,
                language: language.into(),
                metadata,
            },
        }
    }

    pub fn scanned(
        user_id: impl Into<String>,
        title: impl Into<String>,
        simplified_language: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            details: RecordDetails::Scanned {
                simplified_language,
            },
        }
    }

    pub fn into_record(self, id: Uuid, created_at: OffsetDateTime) -> DocumentRecord {
        DocumentRecord {
            id,
            user_id: self.user_id,
            title: self.title,
            created_at,
            details: self.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn generated_record_serializes_with_type_tag() {
        let mut metadata = Metadata::new();
        metadata.insert("partyName".into(), "Acme".into());
        let record = NewRecord::generated("user-1", Some("nda".into()), "NDA", "en", metadata)
            .into_record(Uuid::nil(), datetime!(2026-01-02 03:04:05 UTC));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "generated");
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["documentType"], "nda");
        assert_eq!(json["metadata"]["partyName"], "Acme");
        assert_eq!(json["createdAt"], "2026-01-02T03:04:05Z");
        assert!(json.get("simplifiedLanguage").is_none());
    }

    #[test]
    fn scanned_record_carries_no_document_type() {
        let record = NewRecord::scanned("user-1", "Scan", Some("hi".into()))
            .into_record(Uuid::nil(), datetime!(2026-01-02 03:04:05 UTC));

        assert_eq!(record.kind(), DocumentKind::Scanned);
        assert_eq!(record.document_type(), None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "scanned");
        assert_eq!(json["simplifiedLanguage"], "hi");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn kind_parse_matches_as_str() {
        for kind in [DocumentKind::Generated, DocumentKind::Scanned] {
            assert_eq!(DocumentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DocumentKind::parse("edited"), None);
    }
}
