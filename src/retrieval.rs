//! Owner-scoped, newest-first listing and search over committed receipts.

use std::sync::Arc;

use tracing::debug;

use crate::receipt::{AccountId, Receipt, ReceiptStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("login required")]
    Unauthenticated,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct Retrieval {
    receipts: Arc<dyn ReceiptStore>,
}

impl Retrieval {
    pub fn new(receipts: Arc<dyn ReceiptStore>) -> Self {
        Self { receipts }
    }

    /// Receipts of the caller, optionally narrowed to those whose text
    /// contains `query`. An empty query lists everything.
    pub async fn list(
        &self,
        caller: Option<AccountId>,
        query: Option<&str>,
    ) -> Result<Vec<Receipt>, RetrievalError> {
        let owner = caller.ok_or(RetrievalError::Unauthenticated)?;

        let receipts = match query.filter(|q| !q.is_empty()) {
            Some(q) => self.receipts.list_by_owner_matching(owner, Some(q)).await?,
            None => self.receipts.list_by_owner(owner).await?,
        };

        debug!(
            "Listed {} receipts for account {} (query={:?})",
            receipts.len(),
            owner,
            query
        );
        Ok(receipts)
    }
}
