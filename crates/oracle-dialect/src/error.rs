//! Error types for the dialect adapter.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::connection::DriverError;

/// Main error type for SQL generation and execution.
#[derive(Error, Debug)]
pub enum DialectError {
    /// The database host could not be reached (EHOSTUNREACH, ENETUNREACH, EADDRNOTAVAIL).
    #[error("Host not reachable: {0}")]
    HostNotReachable(String),

    /// DNS resolution of the host failed.
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// The host actively refused the connection.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Login or access-denied failure reported by the driver.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The connection parameters were rejected as invalid.
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    /// Generic connection-level failure with no recognized code.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connect attempt exceeded its configured timeout.
    ///
    /// Deliberately distinct from driver-reported connection errors so
    /// callers can tell a slow network from a broken one.
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// Generic statement-level driver error that matched no known pattern.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: Option<String>,
    },

    /// A unique or primary key constraint was violated.
    ///
    /// `fields` maps the violated key's declared field names to the
    /// offending values when the driver message carried them.
    #[error("Unique constraint violation on {constraint}: {message}")]
    UniqueConstraint {
        constraint: String,
        message: String,
        fields: BTreeMap<String, String>,
    },

    /// A foreign key constraint rejected the statement.
    #[error("Foreign key constraint violation: {index}")]
    ForeignKeyConstraint { index: String },

    /// A constraint could not be dropped or resolved.
    #[error("Unknown constraint: {constraint}")]
    UnknownConstraint { constraint: String },

    /// SQL generation failed (bad descriptor).
    #[error("Query generation error: {0}")]
    Query(String),

    /// Connection pool failure.
    #[error("Pool error: {0}")]
    Pool(String),
}

impl DialectError {
    /// Create a generation-time error.
    pub fn query(message: impl Into<String>) -> Self {
        DialectError::Query(message.into())
    }

    /// Wrap a raw driver error as a generic database error.
    pub fn database(err: DriverError) -> Self {
        DialectError::Database {
            message: err.message,
            code: err.code,
        }
    }

    /// True for any member of the connection error family, timeout included.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DialectError::HostNotReachable(_)
                | DialectError::HostNotFound(_)
                | DialectError::ConnectionRefused(_)
                | DialectError::AccessDenied(_)
                | DialectError::InvalidConnection(_)
                | DialectError::Connection(_)
                | DialectError::ConnectTimeout(_)
        )
    }
}

/// Result type alias for dialect operations.
pub type Result<T> = std::result::Result<T, DialectError>;
