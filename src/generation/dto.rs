use serde::{Deserialize, Serialize};

use super::InlineImage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub document_type: String,
    pub user_inputs: String,
    pub language: Option<String>,
    pub title: Option<String>,
    pub party_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifyRequest {
    pub text: Option<String>,
    /// Raw base64 or a `data:<mime>;base64,` URL.
    pub image: Option<String>,
    /// Language code, or `auto` to keep the input's language.
    pub language: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplifyResponse {
    pub simplified_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
}

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

pub fn inline_image(raw: &str) -> InlineImage {
    match raw.split_once("base64,") {
        Some((header, data)) => {
            let mime_type = header
                .strip_prefix("data:")
                .map(|h| h.trim_end_matches(';'))
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_IMAGE_MIME);
            InlineImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }
        }
        None => InlineImage {
            mime_type: DEFAULT_IMAGE_MIME.into(),
            data: raw.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_carries_its_mime_type() {
        let image = inline_image("data:image/png;base64,iVBOR");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "iVBOR");

        let bare = inline_image("/9j/4AAQ");
        assert_eq!(bare.mime_type, "image/jpeg");
        assert_eq!(bare.data, "/9j/4AAQ");
    }
}
