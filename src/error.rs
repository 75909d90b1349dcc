use crate::domain::purchase::{PurchaseId, PurchaseStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Field {field} is {len} characters long, maximum is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("Checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch { expected: String, found: String },
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Purchase {id} is already {status}")]
    AlreadyFinalized {
        id: PurchaseId,
        status: PurchaseStatus,
    },
    #[error("Confirmation oracle unreachable: {0}")]
    OracleUnreachable(String),
    #[error("Purchase {id} changed concurrently: expected {expected}, found {actual}")]
    PersistenceConflict {
        id: PurchaseId,
        expected: PurchaseStatus,
        actual: PurchaseStatus,
    },
    #[error("Purchase {0} not found")]
    PurchaseNotFound(PurchaseId),
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl CheckoutError {
    /// Errors that leave state untouched and may succeed if the call is repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::OracleUnreachable(_) | CheckoutError::StorageUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
