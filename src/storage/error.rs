//! Error types for storage operations

use std::fmt;
use std::io::ErrorKind;

use crate::ValidationError;
use crate::retry::{RetryError, Retriable};

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug)]
pub enum StorageError {
    /// Requested metric does not exist
    NotFound(String),

    /// Metric rejected before it reached the backend
    Validation(String),

    /// Failure expected to clear up on its own (lost connection, lock
    /// contention, serialization conflict)
    Transient(String),

    /// Database connection failed
    ConnectionFailed(String),

    /// Database query failed
    QueryFailed(String),

    /// Migration failed
    MigrationFailed(String),

    /// Snapshot serialization/deserialization error
    SerializationError(String),

    /// I/O error (snapshot file access, etc.)
    IoError(std::io::Error),

    /// A retriable failure persisted past the retry budget
    RetriesExhausted {
        attempts: u32,
        last: Box<StorageError>,
    },

    /// Shutdown was requested while waiting to retry
    Cancelled(Box<StorageError>),
}

impl StorageError {
    pub fn not_found(kind: crate::MetricKind, name: &str) -> Self {
        StorageError::NotFound(format!("{kind} {name}"))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(what) => write!(f, "metric not found: {}", what),
            StorageError::Validation(msg) => write!(f, "invalid metric: {}", msg),
            StorageError::Transient(msg) => write!(f, "transient storage failure: {}", msg),
            StorageError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to storage backend: {}", msg)
            }
            StorageError::QueryFailed(msg) => write!(f, "storage query failed: {}", msg),
            StorageError::MigrationFailed(msg) => write!(f, "database migration failed: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "snapshot serialization error: {}", msg),
            StorageError::IoError(err) => write!(f, "I/O error: {}", err),
            StorageError::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            StorageError::Cancelled(last) => write!(f, "cancelled while retrying: {}", last),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            StorageError::RetriesExhausted { last, .. } => Some(last.as_ref()),
            StorageError::Cancelled(last) => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl Retriable for StorageError {
    fn is_retriable(&self) -> bool {
        match self {
            StorageError::Transient(_) => true,
            StorageError::IoError(err) => matches!(
                err.kind(),
                ErrorKind::WouldBlock
                    | ErrorKind::Interrupted
                    | ErrorKind::PermissionDenied
                    | ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

impl From<RetryError<StorageError>> for StorageError {
    fn from(err: RetryError<StorageError>) -> Self {
        match err {
            RetryError::Permanent(err) => err,
            RetryError::Exhausted { attempts, last } => StorageError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Cancelled { last, .. } => StorageError::Cancelled(Box::new(last)),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<ValidationError> for StorageError {
    fn from(err: ValidationError) -> Self {
        StorageError::Validation(err.to_string())
    }
}

/// Message raised by the counter triggers when a sum leaves the integer range.
#[cfg(feature = "storage-sqlite")]
pub(crate) const COUNTER_OVERFLOW: &str = "counter overflow";

/// SQLite primary result codes that signal lock contention.
#[cfg(feature = "storage-sqlite")]
const SQLITE_BUSY: i64 = 5;
#[cfg(feature = "storage-sqlite")]
const SQLITE_LOCKED: i64 = 6;

/// Whether a database error code names a condition worth retrying.
///
/// SQLSTATE codes are always five characters. SQLite reports shorter
/// numeric result codes whose low byte is the primary code.
#[cfg(feature = "storage-sqlite")]
fn is_transient_code(code: &str) -> bool {
    if code.len() == 5 {
        return code.starts_with("08") || code == "40001" || code == "40P01";
    }

    code.parse::<i64>().is_ok_and(|numeric| {
        let primary = numeric & 0xff;
        primary == SQLITE_BUSY || primary == SQLITE_LOCKED
    })
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::Transient(io_err.to_string()),
            sqlx::Error::PoolTimedOut => StorageError::Transient("connection pool timed out".to_string()),
            sqlx::Error::PoolClosed => StorageError::ConnectionFailed("connection pool closed".to_string()),
            sqlx::Error::RowNotFound => StorageError::QueryFailed("no rows found".to_string()),
            sqlx::Error::Database(db_err) if db_err.message().contains(COUNTER_OVERFLOW) => {
                StorageError::Validation(db_err.message().to_string())
            }
            sqlx::Error::Database(db_err) => {
                let transient = db_err.code().is_some_and(|code| is_transient_code(&code));
                if transient {
                    StorageError::Transient(db_err.to_string())
                } else {
                    StorageError::QueryFailed(db_err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        match err {
            sqlx::migrate::MigrateError::Execute(inner) => match StorageError::from(inner) {
                transient @ StorageError::Transient(_) => transient,
                other => StorageError::MigrationFailed(other.to_string()),
            },
            other => StorageError::MigrationFailed(other.to_string()),
        }
    }
}
