mod dto;
pub mod gemini;
pub mod handlers;
mod prompts;

use async_trait::async_trait;
use axum::Router;

use crate::state::AppState;

/// Base64 image sent alongside a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: InlineImage) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation API key is not configured")]
    NotConfigured,
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation API returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("generation API returned no content")]
    Empty,
}

/// The external language model. Returns the trimmed, non-empty reply text.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::routes())
}
