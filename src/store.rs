use async_trait::async_trait;
use std::error::Error;

/// Collection every record of this crate is written to.
pub const AUDIT_COLLECTION: &str = "sabi_audit_logs";

/// Asynchronous handle to a flat, key-ordered document store.
///
/// This is the only seam between the audit writers and the network. The
/// Firestore REST client implements it, and so does the in-process
/// [`MemoryStore`](crate::memory::MemoryStore). Hosts can plug in their own
/// client by implementing it directly.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Append `document` to `collection` under a store-assigned id.
    ///
    /// **Returns**
    /// - `Ok(id)` with the identifier the store chose.
    /// - `Err(..)` on transport, permission or quota failures.
    async fn add(&self, collection: &str, document: serde_json::Value) -> Result<String, StoreError>;

    /// Create or replace the document named `id` in `collection`.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Delete the document named `id` in `collection`.
    ///
    /// Deleting a document that does not exist is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

/// Errors surfaced by a [`DocumentStore`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "firestore")]
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("unexpected store response: {0}")]
    MalformedResponse(String),

    #[error("failed to obtain access token: {0}")]
    Credential(#[from] crate::credentials::CredentialError),

    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl StoreError {
    /// Wrap an error from a foreign store client.
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        StoreError::Other(err.into())
    }
}
