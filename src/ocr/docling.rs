//! Docling sidecar OCR provider.

use super::{OcrInput, OcrProvider, OcrResult};
use serde::Deserialize;
use tracing::info;

/// Docling sidecar response (private deserialization types).
#[derive(Debug, Deserialize)]
struct DoclingResponse {
    markdown: String,
    #[serde(default)]
    pages: Vec<DoclingPageContent>,
}

#[derive(Debug, Deserialize)]
struct DoclingPageContent {
    text: String,
}

impl DoclingResponse {
    /// Plain page text when the sidecar returns it, markdown otherwise.
    fn into_text(self) -> String {
        if self.pages.iter().any(|p| !p.text.trim().is_empty()) {
            self.pages
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            self.markdown
        }
    }
}

pub struct DoclingProvider {
    url: String,
    client: reqwest::Client,
}

impl DoclingProvider {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl OcrProvider for DoclingProvider {
    fn name(&self) -> &str {
        "docling"
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        use reqwest::multipart::{Form, Part};

        info!(
            "DoclingProvider: sending {} ({} bytes) to sidecar",
            input.filename,
            input.data.len()
        );

        let part = Part::bytes(input.data.clone())
            .file_name(input.filename.clone())
            .mime_str(image_mime(&input.filename))?;

        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/convert", self.url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Docling sidecar error ({}): {}", status, error_text);
        }

        let docling: DoclingResponse = response.json().await?;

        Ok(OcrResult {
            text: docling.into_text(),
            provider_name: "docling".to_string(),
        })
    }
}

/// Best guess at an image MIME type from the upload's extension.
pub(crate) fn image_mime(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_mime() {
        assert_eq!(image_mime("a.PNG"), "image/png");
        assert_eq!(image_mime("scan.jpeg"), "image/jpeg");
        assert_eq!(image_mime("noext"), "application/octet-stream");
    }

    #[test]
    fn test_response_prefers_page_text() {
        let resp: DoclingResponse = serde_json::from_str(
            r##"{"markdown": "# Total", "pages": [{"page_num": 1, "text": "Total 42.00"}], "total_pages": 1}"##,
        )
        .unwrap();
        assert_eq!(resp.into_text(), "Total 42.00");

        let resp: DoclingResponse =
            serde_json::from_str(r#"{"markdown": "Total 42.00", "pages": []}"#).unwrap();
        assert_eq!(resp.into_text(), "Total 42.00");
    }
}
