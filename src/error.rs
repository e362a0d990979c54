//! Error types for ingest, storage and history queries.
//!
//! Client-input errors are rejected before any state changes. Store errors are split into
//! transient contention (retried) and everything else (surfaced, unit rolled back).

use thiserror::Error;

use crate::retry::Transient;

/// SQLite primary result codes that mean "try again later".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Failure from the persistent store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lock / busy-timeout / pool exhaustion; safe to retry the whole unit.
    #[error("store contention: {0}")]
    Contention(String),

    /// Non-transient I/O or integrity failure.
    #[error("store failure: {0}")]
    Failure(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let transient = match &e {
            sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        };
        if transient {
            Self::Contention(e.to_string())
        } else {
            Self::Failure(e.to_string())
        }
    }
}

/// Rejection reason for one report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("required fields {expected}, received {received}")]
    SchemaMismatch { expected: usize, received: usize },

    #[error("field {field} expects {expected}, received {value:?}")]
    FieldTypeError {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("timestamp {timestamp} is not a multiple of {window}")]
    UnalignedTimestamp { timestamp: i64, window: i64 },

    #[error("timestamp {timestamp} is not after the previous report at {previous}")]
    OutOfOrder { timestamp: i64, previous: i64 },

    #[error("store busy after {attempts} attempt(s): {reason}")]
    StoreContention { attempts: u32, reason: String },

    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl IngestError {
    /// Caller sent a bad report (400-class); nothing was mutated.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaMismatch { .. }
                | Self::FieldTypeError { .. }
                | Self::UnalignedTimestamp { .. }
                | Self::OutOfOrder { .. }
        )
    }
}

impl Transient for IngestError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::StoreContention { .. })
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Contention(reason) => Self::StoreContention {
                attempts: 1,
                reason,
            },
            StoreError::Failure(msg) => Self::StoreFailure(msg),
        }
    }
}

/// Read-path failure. Never mutates state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown client {0}")]
    UnknownClient(i64),

    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("window must be > 0 seconds, got {0}")]
    InvalidWindow(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_display() {
        let err = IngestError::SchemaMismatch {
            expected: 37,
            received: 36,
        };
        assert_eq!(err.to_string(), "required fields 37, received 36");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_store_error_conversion() {
        let busy: IngestError = StoreError::Contention("database is locked".into()).into();
        assert!(busy.is_transient());
        assert!(!busy.is_client_error());

        let failed: IngestError = StoreError::Failure("disk I/O error".into()).into();
        assert!(!failed.is_transient());
        assert_eq!(failed, IngestError::StoreFailure("disk I/O error".into()));
    }

    #[test]
    fn test_pool_timeout_is_contention() {
        let e: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(e.is_transient());
        let e: StoreError = sqlx::Error::RowNotFound.into();
        assert!(!e.is_transient());
    }
}
