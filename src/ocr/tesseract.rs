//! Local Tesseract provider (runs the `tesseract` binary).

use std::process::Stdio;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use super::{OcrInput, OcrProvider, OcrResult};

pub struct TesseractProvider {
    binary: String,
    lang: String,
}

impl TesseractProvider {
    pub fn new(binary: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            lang: lang.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["stdin", "stdout", "-l", self.lang.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl OcrProvider for TesseractProvider {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        info!(
            "TesseractProvider: recognizing {} ({} bytes, lang={})",
            input.filename,
            input.data.len(),
            self.lang
        );

        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary))?;

        // Feed stdin from its own task so a full stdout pipe cannot deadlock us.
        let mut stdin = child.stdin.take().context("tesseract stdin not captured")?;
        let data = input.data.clone();
        let feeder = tokio::spawn(async move {
            stdin.write_all(&data).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for tesseract")?;

        if let Ok(Err(e)) = feeder.await {
            // tesseract may exit before reading everything on a bad image
            tracing::debug!("TesseractProvider: stdin write ended early: {}", e);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }

        Ok(OcrResult {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
            provider_name: "tesseract".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let provider = TesseractProvider::new("/usr/bin/tesseract", "deu");
        let cmd = provider.command();
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "/usr/bin/tesseract");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["stdin", "stdout", "-l", "deu"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let provider = TesseractProvider::new("/nonexistent/tesseract-binary", "eng");
        let input = OcrInput {
            filename: "a.png".to_string(),
            data: vec![0x89, b'P', b'N', b'G'],
        };

        let err = provider.process(&input).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
