use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use time::OffsetDateTime;
use tracing::{error, instrument, warn};

use crate::documents::model::Metadata;
use crate::documents::titles::{
    display_name, generation_title, is_valid_document_type, normalize_document_type, scan_title,
};
use crate::{auth::AuthUser, state::AppState};

use super::dto::{inline_image, GenerateRequest, GenerateResponse, SimplifyRequest, SimplifyResponse};
use super::prompts::{generation_prompt, language_name, simplify_prompt, OCR_PROMPT};
use super::{GenerationError, GenerationRequest};

type ApiError = (StatusCode, String);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents/generate", post(generate_document))
        .route("/documents/simplify", post(simplify_text))
}

fn upstream_error(e: GenerationError, message: &str) -> ApiError {
    match e {
        GenerationError::NotConfigured => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Document generation is not configured".into(),
        ),
        other => {
            error!(error = %other, "generation call failed");
            (StatusCode::BAD_GATEWAY, message.to_string())
        }
    }
}

/// POST /documents/generate. The generation is tracked only once the model
/// has answered, and tracking never changes the response.
#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn generate_document(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let document_type = normalize_document_type(&body.document_type).unwrap_or_default();
    if document_type.is_empty() || body.user_inputs.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "documentType and userInputs are required".into(),
        ));
    }
    if !is_valid_document_type(&document_type) {
        warn!(document_type = %body.document_type, "invalid document type");
        return Err((StatusCode::BAD_REQUEST, "Invalid document type".into()));
    }

    let document = display_name(&document_type).unwrap_or(document_type.as_str());
    let prompt = generation_prompt(document, &body.user_inputs, body.language.as_deref());
    let content = state
        .generator
        .generate(GenerationRequest::text(prompt))
        .await
        .map_err(|e| upstream_error(e, "Failed to generate document"))?;

    let title = match body.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => generation_title(&document_type, body.party_name.as_deref()),
    };
    let language = body.language.unwrap_or_default();
    let mut metadata = Metadata::new();
    if let Some(party) = body.party_name {
        metadata.insert("partyName".into(), party.into());
    }

    let tracker = state.tracker.clone();
    tokio::spawn(async move {
        tracker
            .record_generation(&user.user_id, &document_type, &title, &language, Some(metadata))
            .await;
    });
    Ok(Json(GenerateResponse { content }))
}

/// POST /documents/simplify. An image is read first and its text simplified
/// unless `text` is also given. Tracked as a scan after success.
#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn simplify_text(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SimplifyRequest>,
) -> Result<Json<SimplifyResponse>, ApiError> {
    let text = body.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let image = body
        .image
        .as_deref()
        .map(str::trim)
        .filter(|i| !i.is_empty())
        .map(inline_image);
    if text.is_none() && image.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Either text or image must be provided".into(),
        ));
    }

    let ocr_text = match image {
        Some(image) => Some(
            state
                .generator
                .generate(GenerationRequest::with_image(OCR_PROMPT, image))
                .await
                .map_err(|e| upstream_error(e, "No text could be extracted from the image"))?,
        ),
        None => None,
    };

    let source = text
        .map(str::to_string)
        .or_else(|| ocr_text.clone())
        .unwrap_or_default();
    let target = body.language.as_deref().and_then(language_name);
    let simplified_text = state
        .generator
        .generate(GenerationRequest::text(simplify_prompt(&source, target)))
        .await
        .map_err(|e| upstream_error(e, "Failed to simplify text"))?;

    let title = match body.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => scan_title(OffsetDateTime::now_utc().date()),
    };
    let language = body.language.clone();
    let tracker = state.tracker.clone();
    tokio::spawn(async move {
        tracker
            .record_scanning(&user.user_id, &title, language.as_deref())
            .await;
    });

    Ok(Json(SimplifyResponse {
        simplified_text,
        ocr_text,
    }))
}
