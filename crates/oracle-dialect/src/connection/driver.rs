//! Driver seam: the async boundary to the vendor client library.
//!
//! Everything above this module speaks [`SqlValue`] rows and named binds;
//! the concrete driver owns the wire protocol. Tests plug in an in-memory
//! implementation.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::bind::BindSpec;
use crate::value::SqlValue;

/// One result row, column name to value.
pub type Row = BTreeMap<String, SqlValue>;

/// Error reported by the vendor driver, before classification.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    /// Vendor error code (`ESOCKET`, `ELOGIN`, `ORA-00001`, ...).
    pub code: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        DriverError {
            code: None,
            message: message.into(),
        }
    }
}

/// Per-statement execution options passed down to the driver.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Row fetch cap for selects.
    pub max_rows: u32,
    /// Commit after the statement unless a transaction is open.
    pub autocommit: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            max_rows: 100,
            autocommit: true,
        }
    }
}

/// Raw, un-normalized statement result.
#[derive(Debug, Clone, Default)]
pub struct RawResult {
    pub rows: Vec<Row>,
    /// Values written into out-binds (`rid`, `affectedRows`).
    pub out_binds: BTreeMap<String, SqlValue>,
    pub rows_affected: Option<u64>,
    /// Column names, in select order.
    pub meta: Vec<String>,
}

/// A live vendor connection.
///
/// `connect` is the factory; every other method operates on an established
/// handle. One statement is in flight per handle at a time, which the
/// [`super::ResourceLock`] wrapper enforces.
#[async_trait]
pub trait Driver: Sized + Send + 'static {
    async fn connect(
        config: &super::ConnectionConfig,
        connect_string: &str,
    ) -> Result<Self, DriverError>;

    async fn execute(
        &mut self,
        sql: &str,
        binds: &BindSpec,
        options: &ExecuteOptions,
    ) -> Result<RawResult, DriverError>;

    async fn begin(&mut self) -> Result<(), DriverError>;
    async fn commit(&mut self) -> Result<(), DriverError>;
    async fn rollback(&mut self) -> Result<(), DriverError>;
    async fn savepoint(&mut self, name: &str) -> Result<(), DriverError>;
    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;

    fn is_closed(&self) -> bool;
    fn is_logged_in(&self) -> bool;

    /// Stable identifier for log correlation.
    fn id(&self) -> u64 {
        0
    }
}

impl fmt::Display for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_rows={} autocommit={}",
            self.max_rows, self.autocommit
        )
    }
}
