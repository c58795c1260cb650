//! Receipt ingestion pipeline.
//!
//! One call to [`Ingestion::ingest`] walks a single upload through
//! `validate → store binary → recognize → commit`. Validation failures happen
//! before any side effect. A binary write failure stops before the receipt
//! store is touched. A commit failure removes the binary that was written for
//! it. Recognition never fails the upload (see [`Recognizer`]).
//!
//! Everything after validation runs on its own task. A caller that goes away
//! mid-upload cannot leave a binary on disk without its receipt.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::blob::{BlobError, BlobStore};
use crate::ocr::Recognizer;
use crate::receipt::{AccountId, Receipt, ReceiptStore, StoreError};

/// Form field the receipt image must be attached under.
pub const UPLOAD_FIELD: &str = "receipt";

/// A file received under [`UPLOAD_FIELD`].
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Why an upload was turned away before anything was written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("no file uploaded")]
    NoFileAttached,
    #[error("malformed upload: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("login required")]
    Unauthenticated,
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    BinaryWrite(#[from] BlobError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("ingestion task failed: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

/// A committed upload.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub receipt: Receipt,
}

impl Ingested {
    pub fn text(&self) -> &str {
        &self.receipt.text
    }
}

/// Pipeline orchestrator, shared by all requests.
#[derive(Clone)]
pub struct Ingestion {
    blobs: Arc<dyn BlobStore>,
    recognizer: Recognizer,
    receipts: Arc<dyn ReceiptStore>,
}

impl Ingestion {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        recognizer: Recognizer,
        receipts: Arc<dyn ReceiptStore>,
    ) -> Self {
        Self {
            blobs,
            recognizer,
            receipts,
        }
    }

    pub async fn ingest(
        &self,
        caller: Option<AccountId>,
        upload: Result<Option<Upload>, Rejection>,
    ) -> Result<Ingested, IngestError> {
        // Validated
        let owner = caller.ok_or(IngestError::Unauthenticated)?;
        let upload = validate(upload?)?;

        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.store_and_commit(owner, upload).await }).await?
    }

    async fn store_and_commit(&self, owner: AccountId, upload: Upload) -> Result<Ingested, IngestError> {
        // Stored(binary)
        let key = self.blobs.put(&upload.filename, &upload.data).await?;

        // Recognized
        let text = self
            .recognizer
            .recognize(&upload.filename, upload.data)
            .await;

        // Committed
        match self.receipts.insert(owner, &upload.filename, &text).await {
            Ok(receipt) => {
                info!(
                    "Ingested receipt {} for account {}: {} ({} chars via {})",
                    receipt.id,
                    owner,
                    receipt.filename,
                    receipt.text.len(),
                    self.recognizer.provider_name()
                );
                Ok(Ingested { receipt })
            }
            Err(e) => {
                error!("Commit failed for {} (account {}): {}", upload.filename, owner, e);
                if let Err(cleanup) = self.blobs.remove(&key).await {
                    warn!("Could not remove orphaned upload {:?}: {}", key, cleanup);
                }
                Err(IngestError::Storage(e))
            }
        }
    }
}

fn validate(upload: Option<Upload>) -> Result<Upload, Rejection> {
    let upload = upload.ok_or(Rejection::NoFileAttached)?;
    if upload.data.is_empty() {
        return Err(Rejection::NoFileAttached);
    }
    if upload.filename.trim().is_empty() {
        return Err(Rejection::Malformed("file has no name".to_string()));
    }
    Ok(upload)
}
