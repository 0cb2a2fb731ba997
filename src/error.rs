use crate::domain::transaction::TransactionStatus;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, RenewalError>;

#[derive(Error, Debug)]
pub enum RenewalError {
    /// A referenced entity does not exist. Consumers treat this as a poison
    /// message: dead-lettered, never redelivered.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// The payment provider could not be reached or answered with a
    /// server-side failure. No state was mutated; the delivery is retried.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// A transition not present in the allowed table was attempted.
    #[error("illegal status transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Unexpected internal failure while a transaction was in flight. The
    /// transaction is aborted and the message dead-lettered.
    #[error("fatal processing error: {0}")]
    Fatal(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("storage error: {0}")]
    StorageError(#[from] rocksdb::Error),

    #[error("internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl RenewalError {
    /// Whether a delivery that failed with this error should be handed back
    /// to the broker for redelivery. Only gateway unavailability qualifies;
    /// every other failure is terminal for the message.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenewalError::GatewayUnavailable(_))
    }
}
