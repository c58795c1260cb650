//! Process configuration, read from the environment (and `.env` via dotenvy).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::ocr::OcrProviderKind;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_OCR_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub identity_file: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub ocr: OcrSettings,
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub provider: OcrProviderKind,
    pub timeout: Duration,
    pub lang: String,
    pub tesseract_bin: String,
    pub docling_url: String,
    pub mistral_api_key: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| ".".to_string()));
        let port = parse_or(get("PORT"), "PORT", DEFAULT_PORT)?;
        let max_upload_bytes =
            parse_or(get("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        if max_upload_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_BYTES must be > 0");
        }

        let identity_file = get("IDENTITY_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("identities.json"));

        let provider = match get("OCR_PROVIDER") {
            Some(name) => name.parse::<OcrProviderKind>()?,
            None => OcrProviderKind::Tesseract,
        };
        let timeout_secs = parse_or(
            get("OCR_TIMEOUT_SECS"),
            "OCR_TIMEOUT_SECS",
            DEFAULT_OCR_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            anyhow::bail!("OCR_TIMEOUT_SECS must be > 0");
        }

        let mistral_api_key = get("MISTRAL_API_KEY");
        if provider == OcrProviderKind::MistralOcr && mistral_api_key.is_none() {
            anyhow::bail!("MISTRAL_API_KEY not set (required by OCR_PROVIDER=mistral_ocr)");
        }

        Ok(Self {
            port,
            max_upload_bytes,
            identity_file,
            static_dir: get("STATIC_DIR").map(PathBuf::from),
            ocr: OcrSettings {
                provider,
                timeout: Duration::from_secs(timeout_secs),
                lang: get("OCR_LANG").unwrap_or_else(|| "eng".to_string()),
                tesseract_bin: get("TESSERACT_BIN").unwrap_or_else(|| "tesseract".to_string()),
                docling_url: get("DOCLING_URL")
                    .unwrap_or_else(|| "http://localhost:3001".to_string()),
                mistral_api_key,
            },
            data_dir,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("receipts.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", key, v)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.data_dir, PathBuf::from("."));
        assert_eq!(s.port, 3000);
        assert_eq!(s.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(s.identity_file, PathBuf::from("./identities.json"));
        assert_eq!(s.static_dir, None);
        assert_eq!(s.ocr.provider, OcrProviderKind::Tesseract);
        assert_eq!(s.ocr.timeout, Duration::from_secs(120));
        assert_eq!(s.ocr.lang, "eng");
        assert_eq!(s.db_path(), PathBuf::from("./receipts.db"));
        assert_eq!(s.uploads_dir(), PathBuf::from("./uploads"));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("DATA_DIR", "/data"),
            ("PORT", "8080"),
            ("OCR_PROVIDER", "docling"),
            ("DOCLING_URL", "http://ocr:9000"),
            ("OCR_TIMEOUT_SECS", "15"),
            ("STATIC_DIR", "public"),
        ])
        .unwrap();
        assert_eq!(s.port, 8080);
        assert_eq!(s.identity_file, PathBuf::from("/data/identities.json"));
        assert_eq!(s.ocr.provider, OcrProviderKind::Docling);
        assert_eq!(s.ocr.docling_url, "http://ocr:9000");
        assert_eq!(s.ocr.timeout, Duration::from_secs(15));
        assert_eq!(s.static_dir, Some(PathBuf::from("public")));
    }

    #[test]
    fn test_empty_value_falls_back_to_default() {
        let s = settings(&[("PORT", ""), ("DATA_DIR", "  ")]).unwrap();
        assert_eq!(s.port, 3000);
        assert_eq!(s.data_dir, PathBuf::from("."));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(settings(&[("PORT", "http")]).is_err());
        assert!(settings(&[("OCR_PROVIDER", "paddle")]).is_err());
        assert!(settings(&[("OCR_TIMEOUT_SECS", "0")]).is_err());
        assert!(settings(&[("MAX_UPLOAD_BYTES", "0")]).is_err());
        assert!(settings(&[("OCR_PROVIDER", "mistral_ocr")]).is_err());
        assert!(settings(&[("OCR_PROVIDER", "mistral_ocr"), ("MISTRAL_API_KEY", "k")]).is_ok());
    }
}
