use serde::Deserialize;

use super::model::Metadata;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordGenerationRequest {
    pub document_type: String,
    pub title: Option<String>,
    pub language: Option<String>,
    pub party_name: Option<String>,
    pub effective_date: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RecordGenerationRequest {
    /// Free-form metadata with the named form fields folded in.
    pub fn into_metadata(self) -> Metadata {
        let mut metadata = self.metadata;
        if let Some(party) = self.party_name {
            metadata.insert("partyName".into(), party.into());
        }
        if let Some(date) = self.effective_date {
            metadata.insert("effectiveDate".into(), date.into());
        }
        metadata
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordScanningRequest {
    pub title: Option<String>,
    pub simplified_language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScannedQuery {
    pub limit: Option<usize>,
}

pub const MAX_SCANNED_LIMIT: usize = 50;

impl ScannedQuery {
    /// `0` is honored and yields an empty list.
    pub fn resolve(&self, default_limit: usize) -> usize {
        self.limit.unwrap_or(default_limit).min(MAX_SCANNED_LIMIT)
    }
}
