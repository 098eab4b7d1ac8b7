//! Error types for the cardroom core.
//!
//! Business-rule failures (`NotFound`, `TableNotOpen`, `InsufficientFunds`,
//! `AssetNotOwned`) surface to the caller as-is and are never retried.
//! `ConcurrencyConflict` marks an optimistic-transaction collision that is
//! eligible for a bounded automatic retry. Oracle failures are caught at
//! single-bet granularity during settlement and become a `cancelled` outcome.

use thiserror::Error;

/// Convenience alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("wallet not found for user {0}")]
    WalletNotFound(String),

    #[error("betting table not found: {0}")]
    TableNotFound(String),

    #[error("bet not found: {0}")]
    BetNotFound(String),

    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("betting table {0} is not open")]
    TableNotOpen(String),

    #[error("betting table {0} is already settled")]
    AlreadySettled(String),

    #[error("you do not own card {0}")]
    AssetNotOwned(String),

    #[error("insufficient chips: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: f64, requested: f64 },

    /// Caller programming error: zero or negative amount passed to a
    /// chip operation. Distinct from `InsufficientFunds`.
    #[error("amount must be greater than 0")]
    InvalidAmount,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("scoring oracle failure: {0}")]
    Oracle(#[from] OracleError),

    /// Optimistic transaction lost a race with a concurrent writer.
    /// Surfaced only after the retry budget is exhausted.
    #[error("transaction conflicted with a concurrent update; retry")]
    ConcurrencyConflict,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database open failed: {0}")]
    OpenFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("corrupted record: {0}")]
    CorruptedData(String),
}

/// Failures talking to the external scoring oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("failed to save configuration: {0}")]
    Save(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl CoreError {
    /// Conflicts are the only errors a transaction runner may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::ConcurrencyConflict)
    }
}

impl From<rocksdb::Error> for CoreError {
    fn from(e: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;
        match e.kind() {
            // Commit-time collision in the optimistic transaction layer.
            ErrorKind::Busy | ErrorKind::TryAgain | ErrorKind::TimedOut => {
                CoreError::ConcurrencyConflict
            }
            _ => CoreError::Storage(StorageError::WriteFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_transient() {
        assert!(CoreError::ConcurrencyConflict.is_transient());
        assert!(!CoreError::InvalidAmount.is_transient());
        assert!(!CoreError::WalletNotFound("u1".into()).is_transient());
    }

    #[test]
    fn oracle_error_wraps() {
        let err: CoreError = OracleError::Timeout(5000).into();
        assert!(err.to_string().contains("5000ms"));
    }

    #[test]
    fn insufficient_funds_display() {
        let err = CoreError::InsufficientFunds {
            balance: 10.0,
            requested: 25.0,
        };
        assert!(err.to_string().contains("balance 10"));
        assert!(err.to_string().contains("requested 25"));
    }
}
