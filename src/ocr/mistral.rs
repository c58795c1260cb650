//! Mistral OCR provider (uses Mistral's OCR API).
//!
//! Receipt images are small, so they are inlined as a base64 `data:` URL
//! instead of going through the Files API.

use super::docling::image_mime;
use super::{OcrInput, OcrProvider, OcrResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const MISTRAL_OCR_URL: &str = "https://api.mistral.ai/v1/ocr";

pub struct MistralOcrProvider {
    api_key: String,
    client: reqwest::Client,
}

impl MistralOcrProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client,
        }
    }
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest {
    model: String,
    document: DocumentSource,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "image_url")]
    Image { image_url: String },
    #[serde(rename = "document_url")]
    Document { document_url: String },
}

#[derive(Deserialize)]
struct OcrResponse {
    pages: Vec<MistralPage>,
}

#[derive(Deserialize)]
struct MistralPage {
    index: u32,
    markdown: String,
}

fn build_request(input: &OcrInput) -> OcrRequest {
    let mime = image_mime(&input.filename);
    let data_url = format!("data:{};base64,{}", mime, BASE64.encode(&input.data));

    let document = if mime == "application/pdf" {
        DocumentSource::Document {
            document_url: data_url,
        }
    } else {
        DocumentSource::Image {
            image_url: data_url,
        }
    };

    OcrRequest {
        model: "mistral-ocr-latest".to_string(),
        document,
    }
}

fn join_pages(mut pages: Vec<MistralPage>) -> String {
    pages.sort_by_key(|p| p.index);
    pages
        .into_iter()
        .map(|p| p.markdown)
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn name(&self) -> &str {
        "mistral_ocr"
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        let body = build_request(input);

        info!(
            "MistralOcrProvider: calling OCR API for {} ({} bytes)",
            input.filename,
            input.data.len()
        );

        let resp = self
            .client
            .post(MISTRAL_OCR_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mistral OCR API error ({}): {}", status, text);
        }

        let raw_text = resp.text().await?;
        debug!(
            "MistralOcrProvider: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );
        let ocr: OcrResponse = serde_json::from_str(&raw_text)?;

        Ok(OcrResult {
            text: join_pages(ocr.pages),
            provider_name: "mistral_ocr".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_sent_as_data_url() {
        let input = OcrInput {
            filename: "a.png".to_string(),
            data: b"png".to_vec(),
        };
        let value = serde_json::to_value(build_request(&input)).unwrap();

        assert_eq!(value["model"], "mistral-ocr-latest");
        assert_eq!(value["document"]["type"], "image_url");
        assert_eq!(value["document"]["image_url"], "data:image/png;base64,cG5n");
    }

    #[test]
    fn test_pdf_sent_as_document_url() {
        let input = OcrInput {
            filename: "scan.pdf".to_string(),
            data: vec![],
        };
        let value = serde_json::to_value(build_request(&input)).unwrap();
        assert_eq!(value["document"]["type"], "document_url");
    }

    #[test]
    fn test_pages_joined_in_index_order() {
        let resp: OcrResponse = serde_json::from_str(
            r#"{"pages": [{"index": 1, "markdown": "Total 42.00"}, {"index": 0, "markdown": "Cafe"}]}"#,
        )
        .unwrap();
        assert_eq!(join_pages(resp.pages), "Cafe\n\nTotal 42.00");
    }
}
