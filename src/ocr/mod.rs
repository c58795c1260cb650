//! Receipt text recognition.
//!
//! [`OcrProvider`] is the seam to an external OCR engine (a local Tesseract
//! binary, a Docling sidecar, Mistral's OCR API). [`Recognizer`] wraps one
//! provider with the best-effort contract the ingestion pipeline relies on:
//! every engine failure, timeout or panic comes back as empty text.

pub mod docling;
pub mod mistral;
pub mod tesseract;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::OcrSettings;

/// An uploaded image handed to an engine.
#[derive(Debug, Clone)]
pub struct OcrInput {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Raw engine output.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    pub provider_name: String,
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult>;
}

/// Known provider identifiers used for configuration lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    Tesseract,
    Docling,
    MistralOcr,
}

impl std::str::FromStr for OcrProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tesseract" => Ok(Self::Tesseract),
            "docling" => Ok(Self::Docling),
            "mistral_ocr" => Ok(Self::MistralOcr),
            other => anyhow::bail!(
                "Unknown OCR provider: '{}'. Must be tesseract, docling, or mistral_ocr.",
                other
            ),
        }
    }
}

/// Construct the configured engine.
pub fn provider_from_settings(settings: &OcrSettings) -> anyhow::Result<Arc<dyn OcrProvider>> {
    let provider: Arc<dyn OcrProvider> = match settings.provider {
        OcrProviderKind::Tesseract => Arc::new(tesseract::TesseractProvider::new(
            settings.tesseract_bin.clone(),
            settings.lang.clone(),
        )),
        OcrProviderKind::Docling => Arc::new(docling::DoclingProvider::new(
            reqwest::Client::new(),
            settings.docling_url.clone(),
        )),
        OcrProviderKind::MistralOcr => {
            let api_key = settings
                .mistral_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("MISTRAL_API_KEY not set"))?;
            Arc::new(mistral::MistralOcrProvider::new(reqwest::Client::new(), api_key))
        }
    };
    Ok(provider)
}

/// Best-effort recognition over a single provider.
#[derive(Clone)]
pub struct Recognizer {
    provider: Arc<dyn OcrProvider>,
    timeout: Duration,
}

impl Recognizer {
    pub fn new(provider: Arc<dyn OcrProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Recognize text in `data`, returning `""` when the engine fails.
    ///
    /// The engine runs on its own task: it is attempted exactly once and runs
    /// to completion or timeout even if the caller stops waiting.
    pub async fn recognize(&self, filename: &str, data: Vec<u8>) -> String {
        let provider = Arc::clone(&self.provider);
        let timeout = self.timeout;
        let input = OcrInput {
            filename: filename.to_string(),
            data,
        };

        let task = tokio::spawn(async move {
            tokio::time::timeout(timeout, provider.process(&input)).await
        });

        match task.await {
            Ok(Ok(Ok(result))) => {
                let text = normalize_text(&result.text);
                debug!(
                    "Recognizer: {} produced {} chars for {}",
                    result.provider_name,
                    text.len(),
                    filename
                );
                text
            }
            Ok(Ok(Err(e))) => {
                warn!("Recognizer: {} failed on {}: {:#}", self.provider.name(), filename, e);
                String::new()
            }
            Ok(Err(_)) => {
                warn!(
                    "Recognizer: {} timed out after {:?} on {}",
                    self.provider.name(),
                    timeout,
                    filename
                );
                String::new()
            }
            Err(e) => {
                warn!("Recognizer: {} task aborted on {}: {}", self.provider.name(), filename, e);
                String::new()
            }
        }
    }
}

/// Clean up engine output before it is persisted.
///
/// Unifies line endings, drops form feeds and NULs, strips trailing
/// whitespace per line and trims leading/trailing blank lines. Interior
/// spacing and blank lines are kept.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<&str> = unified
        .split('\n')
        .map(|line| line.trim_end_matches(|c: char| c.is_whitespace() || c == '\0'))
        .collect();

    let lines: Vec<String> = lines
        .into_iter()
        .map(|line| line.chars().filter(|c| *c != '\u{c}' && *c != '\0').collect())
        .collect();

    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());

    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}
