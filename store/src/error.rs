use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Wrong password or unreadable key material; the two look the same.
    #[error("wrong password or corrupted key data")]
    Credential,

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),
}
