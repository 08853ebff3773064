//! Statement execution: lock acquisition, transaction-control dispatch,
//! driver calls and result normalization.

pub mod classify;

use std::time::Instant;

use tracing::debug;

use crate::bind::{BindSpec, AFFECTED_ROWS, RID};
use crate::connection::{is_socket_reset, Driver, ExecuteOptions, RawResult, ResourceLock, Row};
use crate::descriptor::Model;
use crate::error::{DialectError, Result};
use crate::generator::StatementKind;
use crate::value::SqlValue;

/// One entry of a show-tables result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub table_name: String,
    pub schema: Option<String>,
}

/// Normalized statement result, shaped by the statement kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Row>),
    /// Generated key from the `rid` out-bind, when the insert asked for it.
    Inserted { id: Option<i64> },
    /// Row count from the `affectedRows` out-bind.
    Affected(u64),
    /// `PRODUCT=..., VERSION=..., STATUS=...` of the database product row.
    Version(String),
    Tables(Vec<TableEntry>),
    Raw { rows: Vec<Row>, meta: Vec<String> },
    Done,
}

/// A single statement bound to a connection lock.
///
/// Holds the executor options for one run; the generator's statement kind
/// decides how the raw driver result is normalized.
pub struct Query<'a, D> {
    lock: &'a ResourceLock<D>,
    kind: StatementKind,
    model: Option<&'a Model>,
    options: ExecuteOptions,
    benchmark: bool,
}

impl<'a, D: Driver> Query<'a, D> {
    pub fn new(lock: &'a ResourceLock<D>, kind: StatementKind) -> Self {
        Query {
            lock,
            kind,
            model: None,
            options: ExecuteOptions::default(),
            benchmark: false,
        }
    }

    /// Attach model metadata, used to map constraint violations back to
    /// field names.
    pub fn model(mut self, model: &'a Model) -> Self {
        self.model = Some(model);
        self
    }

    pub fn max_rows(mut self, max_rows: u32) -> Self {
        self.options.max_rows = max_rows;
        self
    }

    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.options.autocommit = autocommit;
        self
    }

    /// Log statement timing at debug level.
    pub fn benchmark(mut self, benchmark: bool) -> Self {
        self.benchmark = benchmark;
        self
    }

    /// Execute one statement. The connection lock is held for the duration
    /// of the call and released on every exit path.
    pub async fn run(&self, sql: &str, binds: &BindSpec) -> Result<QueryOutcome> {
        let mut guard = self.lock.lock().await;
        let connection = guard.connection().ok_or_else(|| {
            DialectError::Connection("connection has been evicted".to_string())
        })?;

        debug!(id = connection.id(), sql, "executing");
        let started = self.benchmark.then(Instant::now);

        let outcome = match transaction_call(sql) {
            Some(call) => {
                self.run_transaction_call(&mut *connection, call)
                    .await
                    .map_err(|e| classify::format_error(e, self.model))?;
                QueryOutcome::Done
            }
            None => match connection.execute(sql, binds, &self.options).await {
                Ok(raw) => normalize(self.kind, raw),
                Err(err) => {
                    if is_socket_reset(err.code.as_deref()) {
                        self.lock.mark_broken();
                    }
                    return Err(classify::format_error(err, self.model));
                }
            },
        };

        if let Some(started) = started {
            debug!(
                id = connection.id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "statement finished"
            );
        }
        Ok(outcome)
    }

    async fn run_transaction_call(
        &self,
        connection: &mut D,
        call: TransactionCall<'_>,
    ) -> std::result::Result<(), crate::connection::DriverError> {
        match call {
            TransactionCall::Begin => connection.begin().await,
            TransactionCall::Commit => connection.commit().await,
            TransactionCall::Rollback => connection.rollback().await,
            TransactionCall::RollbackTo(name) => connection.rollback_to_savepoint(name).await,
            TransactionCall::Savepoint(name) => connection.savepoint(name).await,
        }
    }

}

/// Shape the raw driver result by statement kind.
fn normalize(kind: StatementKind, raw: RawResult) -> QueryOutcome {
    match kind {
        StatementKind::Select | StatementKind::Describe | StatementKind::ShowIndexes => {
            QueryOutcome::Rows(raw.rows)
        }
        StatementKind::Insert | StatementKind::Upsert => QueryOutcome::Inserted {
            id: raw.out_binds.get(RID).and_then(SqlValue::as_int),
        },
        StatementKind::Update | StatementKind::Delete | StatementKind::BulkInsert => {
            let affected = raw
                .out_binds
                .get(AFFECTED_ROWS)
                .and_then(SqlValue::as_int)
                .map(|n| n.max(0) as u64)
                .or(raw.rows_affected)
                .unwrap_or(0);
            QueryOutcome::Affected(affected)
        }
        StatementKind::Version => QueryOutcome::Version(version_from_rows(&raw.rows)),
        StatementKind::ShowTables => QueryOutcome::Tables(
            raw.rows
                .iter()
                .map(|row| TableEntry {
                    table_name: row
                        .get("TABLE_NAME")
                        .and_then(SqlValue::as_text)
                        .unwrap_or_default()
                        .to_string(),
                    schema: row
                        .get("TABLE_SCHEMA")
                        .and_then(SqlValue::as_text)
                        .map(str::to_string),
                })
                .collect(),
        ),
        StatementKind::ShowConstraints => QueryOutcome::Rows(
            raw.rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|(key, value)| (camel_case(&key), value))
                        .collect()
                })
                .collect(),
        ),
        StatementKind::Ddl => QueryOutcome::Done,
        StatementKind::Raw => QueryOutcome::Raw {
            rows: raw.rows,
            meta: raw.meta,
        },
    }
}

/// Constraint rows come back with dictionary-cased keys
/// (`CONSTRAINT_NAME`); callers expect `constraintName`.
fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, segment) in key.split('_').enumerate() {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if i > 0 => {
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_lowercase());
            }
            Some(first) => {
                out.extend(first.to_lowercase());
                out.push_str(&chars.as_str().to_lowercase());
            }
            None => {}
        }
    }
    out
}

enum TransactionCall<'a> {
    Begin,
    Commit,
    Rollback,
    RollbackTo(&'a str),
    Savepoint(&'a str),
}

/// Transaction-control statements map to driver calls instead of being
/// sent as SQL text.
fn transaction_call(sql: &str) -> Option<TransactionCall<'_>> {
    let sql = sql.trim();
    if sql.starts_with("BEGIN TRANSACTION") {
        return Some(TransactionCall::Begin);
    }
    if sql.starts_with("COMMIT TRANSACTION") {
        return Some(TransactionCall::Commit);
    }
    if let Some(rest) = sql.strip_prefix("ROLLBACK TRANSACTION") {
        let name = rest.trim().trim_matches('"');
        return Some(if name.is_empty() {
            TransactionCall::Rollback
        } else {
            TransactionCall::RollbackTo(name)
        });
    }
    if let Some(rest) = sql.strip_prefix("SAVE TRANSACTION") {
        let name = rest.trim().trim_matches('"');
        if !name.is_empty() {
            return Some(TransactionCall::Savepoint(name));
        }
    }
    None
}

fn version_from_rows(rows: &[Row]) -> String {
    let mut result = String::new();
    for row in rows {
        let product = row.get("PRODUCT").and_then(SqlValue::as_text).unwrap_or("");
        if product.contains("Database") {
            let version = row.get("VERSION").and_then(SqlValue::as_text).unwrap_or("");
            let status = row.get("STATUS").and_then(SqlValue::as_text).unwrap_or("");
            result = format!("PRODUCT={product}, VERSION={version}, STATUS={status}");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), SqlValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_transaction_prefix_parsing() {
        assert!(matches!(
            transaction_call("BEGIN TRANSACTION"),
            Some(TransactionCall::Begin)
        ));
        assert!(matches!(
            transaction_call("COMMIT TRANSACTION"),
            Some(TransactionCall::Commit)
        ));
        assert!(matches!(
            transaction_call("ROLLBACK TRANSACTION"),
            Some(TransactionCall::Rollback)
        ));
        match transaction_call("ROLLBACK TRANSACTION \"sp1\"") {
            Some(TransactionCall::RollbackTo(name)) => assert_eq!(name, "sp1"),
            other => panic!("expected RollbackTo, got {:?}", other.is_some()),
        }
        match transaction_call("SAVE TRANSACTION \"sp1\"") {
            Some(TransactionCall::Savepoint(name)) => assert_eq!(name, "sp1"),
            other => panic!("expected Savepoint, got {:?}", other.is_some()),
        }
        assert!(transaction_call("SELECT 1 FROM dual").is_none());
    }

    #[test]
    fn test_version_row_scan() {
        let rows = vec![
            row(&[
                ("PRODUCT", "NLSRTL"),
                ("VERSION", "12.1.0.2.0"),
                ("STATUS", "Production"),
            ]),
            row(&[
                ("PRODUCT", "Oracle Database 12c Enterprise Edition"),
                ("VERSION", "12.1.0.2.0"),
                ("STATUS", "64bit Production"),
            ]),
        ];
        assert_eq!(
            version_from_rows(&rows),
            "PRODUCT=Oracle Database 12c Enterprise Edition, \
             VERSION=12.1.0.2.0, STATUS=64bit Production"
        );
        assert_eq!(version_from_rows(&[]), "");
    }

    #[test]
    fn test_affected_count_prefers_out_bind() {
        let mut out_binds = BTreeMap::new();
        out_binds.insert(AFFECTED_ROWS.to_string(), SqlValue::Int(3));
        let raw = RawResult {
            out_binds,
            rows_affected: Some(99),
            ..Default::default()
        };
        assert_eq!(
            normalize(StatementKind::Update, raw),
            QueryOutcome::Affected(3)
        );
    }

    #[test]
    fn test_insert_id_from_rid_out_bind() {
        let mut out_binds = BTreeMap::new();
        out_binds.insert(RID.to_string(), SqlValue::Int(41));
        let raw = RawResult {
            out_binds,
            ..Default::default()
        };
        assert_eq!(
            normalize(StatementKind::Insert, raw),
            QueryOutcome::Inserted { id: Some(41) }
        );
    }

    #[test]
    fn test_show_tables_mapping() {
        let raw = RawResult {
            rows: vec![row(&[("TABLE_NAME", "users"), ("TABLE_SCHEMA", "scott")])],
            ..Default::default()
        };
        assert_eq!(
            normalize(StatementKind::ShowTables, raw),
            QueryOutcome::Tables(vec![TableEntry {
                table_name: "users".to_string(),
                schema: Some("scott".to_string()),
            }])
        );
    }

    #[test]
    fn test_camel_case_keys() {
        assert_eq!(camel_case("CONSTRAINT_NAME"), "constraintName");
        assert_eq!(camel_case("R_CONSTRAINT_NAME"), "rConstraintName");
        assert_eq!(camel_case("NAME"), "name");
    }

    #[test]
    fn test_show_constraints_mapping() {
        let raw = RawResult {
            rows: vec![row(&[
                ("CONSTRAINT_NAME", "ORDERS_PK"),
                ("CONSTRAINT_TYPE", "P"),
            ])],
            ..Default::default()
        };
        assert_eq!(
            normalize(StatementKind::ShowConstraints, raw),
            QueryOutcome::Rows(vec![row(&[
                ("constraintName", "ORDERS_PK"),
                ("constraintType", "P"),
            ])])
        );
    }
}
