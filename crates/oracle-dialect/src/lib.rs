//! # oracle-dialect
//!
//! Oracle SQL generation and execution adapter for a generic query API.
//!
//! The crate turns structured query descriptors into Oracle-flavored SQL
//! and runs the result over an async driver seam, emulating the features
//! the engine lacks:
//!
//! - **ROWNUM pagination** instead of LIMIT/OFFSET
//! - **Sequence plus trigger** autoincrement instead of identity columns
//! - **MERGE-based upserts** with identity-insert bracketing
//! - **RETURNING ... INTO out-binds** for generated keys and row counts
//! - **Idempotent PL/SQL DDL blocks** that swallow already-exists errors
//!
//! ## Example
//!
//! ```rust
//! use oracle_dialect::{Attribute, Model, QueryGenerator, SelectOptions};
//!
//! let model = Model::new("User", "users")
//!     .attribute("id", Attribute::new("INTEGER").primary_key());
//! let generator = QueryGenerator::new();
//! let mut options = SelectOptions::new();
//! options.limit = Some(10);
//! options.offset = Some(20);
//! let query = generator.select_query(&"users".into(), &options, &model)?;
//! assert!(query.sql.contains("ROWNUM_1 BETWEEN 21 AND 30"));
//! # Ok::<(), oracle_dialect::DialectError>(())
//! ```

pub mod bind;
pub mod connection;
pub mod descriptor;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod generator;
pub mod value;

// Re-exports for convenient access
pub use bind::{BindDirection, BindParam, BindSpec, BindType};
pub use connection::{
    ConnectionConfig, ConnectionManager, Driver, DriverError, ExecuteOptions, RawResult,
    ResourceLock, Row,
};
pub use descriptor::{
    Association, AssociationKind, Attribute, CmpOp, Filter, JoinNode, Model, OrderItem,
    Projection, SelectOptions, TableRef, Through, UniqueKey,
};
pub use dialect::DialectSupports;
pub use error::{DialectError, Result};
pub use executor::{Query, QueryOutcome, TableEntry};
pub use generator::{
    CreateTableOptions, DeleteOptions, GeneratedQuery, IndexName, InsertOptions, QueryGenerator,
    StatementKind, UpdateOptions,
};
pub use value::SqlValue;
