use crate::{Result, SessionOptions};

/// The durable form of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Session identifier, the primary key.
    pub id: String,
    /// Base64 of the binary encoded session values.
    pub values: String,
    /// Cookie attributes of the session.
    pub options: SessionOptions,
}

/// Represents a back-end session table.
///
/// Implementations perform exactly one request per call and never retry.
/// Dropping the returned future cancels the call.
#[async_trait::async_trait]
pub trait SessionTable: Send + Sync {
    /// Load the record of a session.
    ///
    /// Returns `Ok(None)` if there is no such record.
    async fn get_record(&self, id: &str) -> Result<Option<StoredRecord>>;

    /// Insert or fully replace the record of a session.
    async fn put_record(&self, record: &StoredRecord) -> Result<()>;

    /// Remove the record of a session. Removing a missing record succeeds.
    async fn delete_record(&self, id: &str) -> Result<()>;
}
