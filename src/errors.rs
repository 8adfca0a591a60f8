//! Error types for the 2D ledger core
//!
//! Every fallible operation returns [`LedgerResult`]. Validation, closed-session
//! and funds errors are raised before any store mutation happens.

use crate::games::types::ClosedReason;

/// Root error type for all ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed selector, stake or settlement parameters
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Betting gate rejected the request
    #[error("Betting is closed: {0}")]
    SessionClosed(ClosedReason),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    /// Lost the compare-and-swap race more times than the retry budget allows
    #[error("Concurrent update conflict after {attempts} attempts, please try again")]
    ConcurrencyConflict { attempts: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Store unavailable or returned undecodable data
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Request validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("selection expands to no numbers: {0}")]
    InvalidSelection(String),

    #[error("stake {amount} outside allowed range {min}..={max}")]
    InvalidAmount { amount: u64, min: u64, max: u64 },

    #[error("'{0}' is not a two-digit number")]
    InvalidNumber(String),

    #[error("multiplier {value} outside allowed range 1..={max}")]
    InvalidMultiplier { value: u64, max: u64 },

    #[error("invalid account id '{0}'")]
    InvalidAccountId(String),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount overflow")]
    Overflow,

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

/// Storage system errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

impl LedgerError {
    /// Whether the caller may simply resubmit the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict { .. })
    }
}

// External error conversions
impl From<rocksdb::Error> for LedgerError {
    fn from(e: rocksdb::Error) -> Self {
        LedgerError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Storage(StorageError::ReadFailed(e.to_string()))
    }
}

// Convenience type alias for Results
pub type LedgerResult<T> = Result<T, LedgerError>;
