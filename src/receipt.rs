//! Receipt records and the store contract they live behind.
//!
//! A receipt is append-only: it is inserted once by the ingestion pipeline and
//! only ever read afterwards. Every read is scoped to a single owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque account handle issued by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An ingested receipt as persisted and as returned over the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub user_id: AccountId,
    /// Original upload name, verbatim.
    pub filename: String,
    /// Recognized text. Empty when recognition produced nothing.
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Failures of the durable receipt medium.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("receipt store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("corrupt receipt row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

/// Durable per-owner receipt collection.
///
/// Implementations must apply the owner filter inside the query itself and
/// return rows ordered by `created_at` descending, then `id` descending.
#[async_trait::async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Persist a new receipt, assigning its `id` and `created_at`.
    async fn insert(
        &self,
        owner: AccountId,
        filename: &str,
        text: &str,
    ) -> Result<Receipt, StoreError>;

    /// All receipts of `owner`, newest first.
    async fn list_by_owner(&self, owner: AccountId) -> Result<Vec<Receipt>, StoreError>;

    /// Receipts of `owner` whose text contains `query` (case-sensitive).
    /// An absent or empty query lists everything, like [`list_by_owner`].
    ///
    /// [`list_by_owner`]: ReceiptStore::list_by_owner
    async fn list_by_owner_matching(
        &self,
        owner: AccountId,
        query: Option<&str>,
    ) -> Result<Vec<Receipt>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_json_shape() {
        let receipt = Receipt {
            id: 7,
            user_id: AccountId(3),
            filename: "a.png".to_string(),
            text: "Total 42.00".to_string(),
            created_at: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        };

        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["user_id"], 3);
        assert_eq!(value["filename"], "a.png");
        assert_eq!(value["text"], "Total 42.00");
        assert_eq!(value["created_at"], "2023-11-14T22:13:20.123Z");
        assert_eq!(value.as_object().unwrap().len(), 5);
    }
}
