//! Query generation: descriptor → SQL text plus bind specification.
//!
//! Everything here is pure translation. The generator owns no connection
//! state; given the same descriptor and capability flags it always emits
//! the same SQL (object-name suffixes for over-long identifiers being the
//! one deliberately random exception).

mod dml;
mod select;
mod table;

pub use dml::{DeleteOptions, InsertOptions, UpdateOptions};
pub use table::CreateTableOptions;

use rand::Rng;

use crate::bind::BindSpec;
use crate::descriptor::{CmpOp, Filter, TableRef};
use crate::dialect::DialectSupports;
use crate::value::SqlValue;

/// Statement classification carried from generation into execution, where
/// it drives result normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    BulkInsert,
    Update,
    Delete,
    Upsert,
    Version,
    ShowTables,
    ShowIndexes,
    ShowConstraints,
    Describe,
    Ddl,
    Raw,
}

/// An index referred to either by its name or by the attributes it covers.
#[derive(Debug, Clone)]
pub enum IndexName {
    Name(String),
    Attributes(Vec<String>),
}

/// Generated SQL with its bind specification and statement kind.
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub sql: String,
    pub binds: BindSpec,
    pub kind: StatementKind,
}

impl GeneratedQuery {
    fn plain(sql: impl Into<String>, kind: StatementKind) -> Self {
        GeneratedQuery {
            sql: sql.into(),
            binds: BindSpec::new(),
            kind,
        }
    }
}

/// Stateless SQL generator for the Oracle dialect.
#[derive(Debug, Clone, Default)]
pub struct QueryGenerator {
    supports: DialectSupports,
}

impl QueryGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_supports(supports: DialectSupports) -> Self {
        QueryGenerator { supports }
    }

    pub fn supports(&self) -> &DialectSupports {
        &self.supports
    }

    // =========================================================================
    // Identifier quoting
    // =========================================================================

    /// Quote an identifier with double quotes.
    ///
    /// Idempotent: any existing quote characters are stripped before
    /// re-applying, so double application cannot mangle a name. `*` passes
    /// through unquoted.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        if identifier == "*" {
            return identifier.to_string();
        }
        format!("\"{}\"", identifier.replace('"', ""))
    }

    /// Quote a possibly dotted path, quoting each segment.
    pub fn quote_path(&self, path: &str) -> String {
        path.split('.')
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quote a table reference, composing the schema when supported and
    /// appending an optional alias.
    pub fn quote_table(&self, table: &TableRef, alias: Option<&str>) -> String {
        let mut out = String::new();
        match &table.schema {
            Some(schema) if self.supports.schemas => {
                out.push_str(&self.quote_identifier(schema));
                out.push('.');
                out.push_str(&self.quote_identifier(&table.name));
            }
            Some(schema) => {
                out.push_str(&self.quote_identifier(&format!("{}.{}", schema, table.name)));
            }
            None => out.push_str(&self.quote_identifier(&table.name)),
        }
        if let Some(alias) = alias {
            out.push(' ');
            out.push_str(&self.quote_identifier(alias));
        }
        out
    }

    // =========================================================================
    // Filter rendering
    // =========================================================================

    /// Render a filter tree into predicate text, prefixing bare columns
    /// with `prefix` when given.
    pub fn where_clause(&self, filter: &Filter, prefix: Option<&str>) -> String {
        match filter {
            Filter::And(items) => self.join_filters(items, " AND ", prefix),
            Filter::Or(items) => self.join_filters(items, " OR ", prefix),
            Filter::Cmp { column, op, value } => {
                let col = self.column_ref(column, prefix);
                match (op, value) {
                    (CmpOp::Eq, SqlValue::Null) => format!("{col} IS NULL"),
                    (CmpOp::Ne, SqlValue::Null) => format!("{col} IS NOT NULL"),
                    (op, value) => format!("{col} {} {}", op.as_sql(), value.to_literal()),
                }
            }
            Filter::In { column, values } => {
                let col = self.column_ref(column, prefix);
                if values.is_empty() {
                    format!("{col} IN (NULL)")
                } else {
                    let list = values
                        .iter()
                        .map(SqlValue::to_literal)
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{col} IN ({list})")
                }
            }
            Filter::IsNull(column) => format!("{} IS NULL", self.column_ref(column, prefix)),
            Filter::NotNull(column) => format!("{} IS NOT NULL", self.column_ref(column, prefix)),
            Filter::Literal(text) => text.clone(),
        }
    }

    fn join_filters(&self, items: &[Filter], sep: &str, prefix: Option<&str>) -> String {
        let rendered: Vec<String> = items
            .iter()
            .map(|f| match f {
                Filter::And(_) | Filter::Or(_) => {
                    format!("({})", self.where_clause(f, prefix))
                }
                other => self.where_clause(other, prefix),
            })
            .collect();
        rendered.join(sep)
    }

    fn column_ref(&self, column: &str, prefix: Option<&str>) -> String {
        if column.contains('.') {
            self.quote_path(column)
        } else {
            match prefix {
                Some(p) => format!("{}.{}", self.quote_path(p), self.quote_identifier(column)),
                None => self.quote_identifier(column),
            }
        }
    }

    // =========================================================================
    // Utility queries
    // =========================================================================

    pub fn version_query(&self) -> GeneratedQuery {
        GeneratedQuery::plain(
            "SELECT * FROM PRODUCT_COMPONENT_VERSION",
            StatementKind::Version,
        )
    }

    pub fn show_tables_query(&self) -> GeneratedQuery {
        GeneratedQuery::plain(
            "SELECT table_name FROM user_tables",
            StatementKind::ShowTables,
        )
    }

    pub fn show_indexes_query(&self, table: &TableRef) -> GeneratedQuery {
        GeneratedQuery::plain(
            format!(
                "SELECT index_name FROM user_indexes WHERE table_name = '{}'",
                table.name.replace('\'', "''")
            ),
            StatementKind::ShowIndexes,
        )
    }

    pub fn describe_table_query(&self, table: &TableRef) -> GeneratedQuery {
        let mut sql = format!(
            "SELECT column_name \"Name\", data_type \"Type\", data_length \"Length\", \
             nullable \"IsNull\", data_default \"Default\" \
             FROM user_tab_columns WHERE table_name = '{}'",
            table.name.replace('\'', "''")
        );
        if let Some(schema) = &table.schema {
            sql = sql.replace("user_tab_columns", "all_tab_columns");
            sql.push_str(&format!(" AND owner = '{}'", schema.replace('\'', "''")));
        }
        GeneratedQuery::plain(sql, StatementKind::Describe)
    }

    pub fn add_column_query(&self, table: &TableRef, name: &str, definition: &str) -> String {
        format!(
            "ALTER TABLE {} ADD {} {}",
            self.quote_table(table, None),
            self.quote_identifier(name),
            definition
        )
    }

    pub fn remove_column_query(&self, table: &TableRef, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_table(table, None),
            self.quote_identifier(name)
        )
    }

    /// Column redefinitions become MODIFY clauses; REFERENCES definitions
    /// become named foreign key constraints instead.
    pub fn change_column_query(&self, table: &TableRef, attributes: &[(String, String)]) -> String {
        let mut modifies = Vec::new();
        let mut constraints = Vec::new();
        for (name, definition) in attributes {
            if let Some(pos) = definition.find("REFERENCES") {
                constraints.push(format!(
                    "{} FOREIGN KEY ({}) {}",
                    self.quote_identifier(&format!("{name}_foreign_idx")),
                    self.quote_identifier(name),
                    &definition[pos..]
                ));
            } else {
                modifies.push(format!("{} {}", self.quote_identifier(name), definition));
            }
        }

        let mut clause = String::new();
        if !modifies.is_empty() {
            clause.push_str("MODIFY ");
            clause.push_str(&modifies.join(", "));
            if !constraints.is_empty() {
                clause.push(' ');
            }
        }
        if !constraints.is_empty() {
            clause.push_str("ADD CONSTRAINT ");
            clause.push_str(&constraints.join(", "));
        }

        format!("ALTER TABLE {} {}", self.quote_table(table, None), clause)
    }

    pub fn rename_column_query(&self, table: &TableRef, before: &str, after: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_table(table, None),
            self.quote_identifier(before),
            self.quote_identifier(after)
        )
    }

    pub fn rename_table_query(&self, before: &TableRef, after: &TableRef) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_table(before, None),
            self.quote_table(after, None)
        )
    }

    /// Drop an index by name, or by the attribute list it was generated
    /// from (underscored `table_attr1_attr2`).
    pub fn remove_index_query(&self, table: &TableRef, index: &IndexName) -> String {
        let name = match index {
            IndexName::Name(name) => name.clone(),
            IndexName::Attributes(attrs) => {
                let mut name = table.name.clone();
                for attr in attrs {
                    name.push('_');
                    name.push_str(attr);
                }
                name
            }
        };
        format!("DROP INDEX {}", self.quote_identifier(&name))
    }

    // =========================================================================
    // Constraint queries
    // =========================================================================

    /// All constraints on a table. Rows come back with dictionary-cased
    /// keys; the executor camel-cases them.
    pub fn show_constraints_query(&self, table: &TableRef) -> GeneratedQuery {
        let mut sql = format!(
            "SELECT constraint_name, constraint_type, search_condition, r_constraint_name \
             FROM user_constraints WHERE table_name = '{}'",
            table.name.replace('\'', "''")
        );
        if let Some(schema) = &table.schema {
            sql = sql.replace("user_constraints", "all_constraints");
            sql.push_str(&format!(" AND owner = '{}'", schema.replace('\'', "''")));
        }
        GeneratedQuery::plain(sql, StatementKind::ShowConstraints)
    }

    /// Names of all foreign key constraints on a table.
    pub fn foreign_keys_query(&self, table: &TableRef) -> GeneratedQuery {
        let mut sql = format!(
            "SELECT constraint_name FROM user_constraints \
             WHERE constraint_type = 'R' AND table_name = '{}'",
            table.name.replace('\'', "''")
        );
        if let Some(schema) = &table.schema {
            sql = sql.replace("user_constraints", "all_constraints");
            sql.push_str(&format!(" AND owner = '{}'", schema.replace('\'', "''")));
        }
        GeneratedQuery::plain(sql, StatementKind::Raw)
    }

    /// Name of the foreign key constraint covering one column.
    pub fn foreign_key_query(&self, table: &TableRef, column: &str) -> GeneratedQuery {
        let mut sql = format!(
            "SELECT uc.constraint_name FROM user_constraints uc \
             JOIN user_cons_columns ucc ON uc.constraint_name = ucc.constraint_name \
             WHERE uc.constraint_type = 'R' AND uc.table_name = '{}' \
             AND ucc.column_name = '{}'",
            table.name.replace('\'', "''"),
            column.replace('\'', "''")
        );
        if let Some(schema) = &table.schema {
            sql = sql.replace("user_constraints uc", "all_constraints uc");
            sql = sql.replace("user_cons_columns ucc", "all_cons_columns ucc");
            sql.push_str(&format!(" AND uc.owner = '{}'", schema.replace('\'', "''")));
        }
        GeneratedQuery::plain(sql, StatementKind::Raw)
    }

    /// Primary key constraint covering one column, with table/column names
    /// aliased for the row mapper.
    pub fn primary_key_constraint_query(&self, table: &TableRef, column: &str) -> GeneratedQuery {
        GeneratedQuery::plain(
            format!(
                "SELECT uc.table_name \"tableName\", ucc.column_name \"columnName\", \
                 uc.constraint_name \"constraintName\" FROM user_constraints uc \
                 JOIN user_cons_columns ucc ON uc.constraint_name = ucc.constraint_name \
                 WHERE uc.constraint_type = 'P' AND uc.table_name = '{}' \
                 AND ucc.column_name = '{}'",
                table.name.replace('\'', "''"),
                column.replace('\'', "''")
            ),
            StatementKind::Raw,
        )
    }

    /// Default value of one column. Defaults are column properties here,
    /// not named constraints, so this reads the column dictionary.
    pub fn default_constraint_query(&self, table: &TableRef, column: &str) -> GeneratedQuery {
        GeneratedQuery::plain(
            format!(
                "SELECT data_default FROM user_tab_columns \
                 WHERE table_name = '{}' AND column_name = '{}'",
                table.name.replace('\'', "''"),
                column.replace('\'', "''")
            ),
            StatementKind::Raw,
        )
    }

    pub fn drop_constraint_query(&self, table: &TableRef, constraint: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_table(table, None),
            self.quote_identifier(constraint)
        )
    }

    /// Foreign keys drop through the same constraint path.
    pub fn drop_foreign_key_query(&self, table: &TableRef, foreign_key: &str) -> String {
        self.drop_constraint_query(table, foreign_key)
    }

    // =========================================================================
    // Transaction control text
    // =========================================================================

    /// A nested transaction becomes a savepoint.
    pub fn start_transaction_query(&self, savepoint: Option<&str>) -> String {
        match savepoint {
            Some(name) => format!("SAVE TRANSACTION {}", self.quote_identifier(name)),
            None => "BEGIN TRANSACTION".to_string(),
        }
    }

    /// Committing a nested transaction is a no-op.
    pub fn commit_transaction_query(&self, nested: bool) -> Option<String> {
        if nested {
            None
        } else {
            Some("COMMIT TRANSACTION".to_string())
        }
    }

    pub fn rollback_transaction_query(&self, savepoint: Option<&str>) -> String {
        match savepoint {
            Some(name) => format!("ROLLBACK TRANSACTION {}", self.quote_identifier(name)),
            None => "ROLLBACK TRANSACTION".to_string(),
        }
    }

    /// Random identifier for a savepoint name.
    pub fn generate_transaction_id(&self) -> String {
        let bytes: [u8; 10] = rand::thread_rng().gen();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Five random alphabetic characters, appended to truncated object names to
/// keep them unique within the identifier limit.
pub(crate) fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..5)
        .map(|_| {
            let v = rng.gen_range(0..52u8);
            char::from(if v < 26 { v + b'A' } else { v - 26 + b'a' })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Filter;

    #[test]
    fn test_quote_identifier_idempotent() {
        let generator = QueryGenerator::new();
        let once = generator.quote_identifier("users");
        let twice = generator.quote_identifier(&once);
        assert_eq!(once, "\"users\"");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_quote_star_passthrough() {
        let generator = QueryGenerator::new();
        assert_eq!(generator.quote_identifier("*"), "*");
    }

    #[test]
    fn test_quote_table_with_schema_and_alias() {
        let generator = QueryGenerator::new();
        let table = TableRef::with_schema("hr", "employees");
        assert_eq!(
            generator.quote_table(&table, Some("e")),
            "\"hr\".\"employees\" \"e\""
        );
    }

    #[test]
    fn test_where_clause_null_handling() {
        let generator = QueryGenerator::new();
        let filter = Filter::eq("deleted_at", SqlValue::Null);
        assert_eq!(
            generator.where_clause(&filter, None),
            "\"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn test_where_clause_nested_grouping() {
        let generator = QueryGenerator::new();
        let filter = Filter::and(vec![
            Filter::eq("a", 1i64),
            Filter::or(vec![Filter::eq("b", 2i64), Filter::eq("c", 3i64)]),
        ]);
        assert_eq!(
            generator.where_clause(&filter, Some("t")),
            "\"t\".\"a\" = 1 AND (\"t\".\"b\" = 2 OR \"t\".\"c\" = 3)"
        );
    }

    #[test]
    fn test_transaction_texts() {
        let generator = QueryGenerator::new();
        assert_eq!(generator.start_transaction_query(None), "BEGIN TRANSACTION");
        assert_eq!(
            generator.start_transaction_query(Some("sp1")),
            "SAVE TRANSACTION \"sp1\""
        );
        assert_eq!(
            generator.rollback_transaction_query(Some("sp1")),
            "ROLLBACK TRANSACTION \"sp1\""
        );
        assert_eq!(generator.commit_transaction_query(true), None);
    }

    #[test]
    fn test_transaction_id_is_hex() {
        let generator = QueryGenerator::new();
        let id = generator.generate_transaction_id();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_suffix_is_alphabetic() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn test_rename_table_query() {
        let generator = QueryGenerator::new();
        assert_eq!(
            generator.rename_table_query(&TableRef::from("users"), &TableRef::from("people")),
            "ALTER TABLE \"users\" RENAME TO \"people\""
        );
    }

    #[test]
    fn test_remove_index_by_name() {
        let generator = QueryGenerator::new();
        let sql = generator.remove_index_query(
            &TableRef::from("users"),
            &IndexName::Name("users_email_idx".into()),
        );
        assert_eq!(sql, "DROP INDEX \"users_email_idx\"");
    }

    #[test]
    fn test_remove_index_by_attributes() {
        let generator = QueryGenerator::new();
        let sql = generator.remove_index_query(
            &TableRef::from("users"),
            &IndexName::Attributes(vec!["first_name".into(), "last_name".into()]),
        );
        assert_eq!(sql, "DROP INDEX \"users_first_name_last_name\"");
    }

    #[test]
    fn test_show_constraints_query() {
        let generator = QueryGenerator::new();
        let query = generator.show_constraints_query(&TableRef::from("orders"));
        assert_eq!(
            query.sql,
            "SELECT constraint_name, constraint_type, search_condition, r_constraint_name \
             FROM user_constraints WHERE table_name = 'orders'"
        );
        assert!(matches!(query.kind, StatementKind::ShowConstraints));
    }

    #[test]
    fn test_show_constraints_query_with_schema() {
        let generator = QueryGenerator::new();
        let query = generator.show_constraints_query(&TableRef::with_schema("hr", "orders"));
        assert!(query.sql.contains("FROM all_constraints"));
        assert!(query.sql.ends_with("AND owner = 'hr'"));
    }

    #[test]
    fn test_foreign_keys_query() {
        let generator = QueryGenerator::new();
        let query = generator.foreign_keys_query(&TableRef::from("orders"));
        assert_eq!(
            query.sql,
            "SELECT constraint_name FROM user_constraints \
             WHERE constraint_type = 'R' AND table_name = 'orders'"
        );
    }

    #[test]
    fn test_foreign_key_query_filters_on_column() {
        let generator = QueryGenerator::new();
        let query = generator.foreign_key_query(&TableRef::from("orders"), "user_id");
        assert!(query.sql.contains("uc.constraint_type = 'R'"));
        assert!(query.sql.contains("uc.table_name = 'orders'"));
        assert!(query.sql.contains("ucc.column_name = 'user_id'"));
    }

    #[test]
    fn test_primary_key_constraint_query_aliases() {
        let generator = QueryGenerator::new();
        let query = generator.primary_key_constraint_query(&TableRef::from("orders"), "id");
        assert!(query.sql.contains("\"tableName\""));
        assert!(query.sql.contains("\"columnName\""));
        assert!(query.sql.contains("\"constraintName\""));
        assert!(query.sql.contains("uc.constraint_type = 'P'"));
        assert!(query.sql.contains("ucc.column_name = 'id'"));
    }

    #[test]
    fn test_default_constraint_query() {
        let generator = QueryGenerator::new();
        let query = generator.default_constraint_query(&TableRef::from("orders"), "status");
        assert_eq!(
            query.sql,
            "SELECT data_default FROM user_tab_columns \
             WHERE table_name = 'orders' AND column_name = 'status'"
        );
    }

    #[test]
    fn test_drop_constraint_queries() {
        let generator = QueryGenerator::new();
        let table = TableRef::from("orders");
        assert_eq!(
            generator.drop_constraint_query(&table, "orders_status_ck"),
            "ALTER TABLE \"orders\" DROP CONSTRAINT \"orders_status_ck\""
        );
        assert_eq!(
            generator.drop_foreign_key_query(&table, "orders_user_id_fk"),
            "ALTER TABLE \"orders\" DROP CONSTRAINT \"orders_user_id_fk\""
        );
    }

    #[test]
    fn test_constraint_query_escapes_quotes() {
        let generator = QueryGenerator::new();
        let query = generator.foreign_keys_query(&TableRef::from("o'brien"));
        assert!(query.sql.contains("table_name = 'o''brien'"));
    }
}
