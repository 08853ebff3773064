//! DML generation: insert, bulk insert, update, delete and MERGE upsert.
//!
//! The driver does not surface affected-row counts for update/delete, so
//! those statements carry a `RETURNING COUNT(*) INTO :affectedRows`
//! out-bind. Inserts asked to report the generated key carry
//! `RETURNING key INTO :rid`.

use crate::bind::{BindParam, BindSpec, AFFECTED_ROWS, RID};
use crate::descriptor::{Filter, Model, TableRef};
use crate::dialect::INLINE_STRING_CAP;
use crate::error::{DialectError, Result};
use crate::value::SqlValue;

use super::{GeneratedQuery, QueryGenerator, StatementKind};

/// Options for single-row inserts.
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    /// Append a `RETURNING key INTO :rid` clause for the generated key.
    pub returning: bool,
    /// Drop null values from the column list instead of inserting NULL.
    pub omit_null: bool,
}

/// Options for updates.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Row limits on update are not supported by this dialect.
    pub limit: Option<u64>,
}

/// Options for deletes.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Row limits on delete are not supported by this dialect.
    pub limit: Option<u64>,
    /// Emit `TRUNCATE TABLE` instead of a filtered delete.
    pub truncate: bool,
}

impl QueryGenerator {
    /// Build a single-row insert.
    pub fn insert_query(
        &self,
        table: &TableRef,
        values: &[(String, SqlValue)],
        model: Option<&Model>,
        options: &InsertOptions,
    ) -> Result<GeneratedQuery> {
        let mut fields: Vec<String> = Vec::new();
        let mut rendered: Vec<String> = Vec::new();
        let mut binds = BindSpec::new();
        let mut identity_wrapper_required = false;

        for (key, value) in values {
            if options.omit_null && value.is_null() {
                continue;
            }
            let attribute = model.and_then(|m| m.get_attribute(key));
            let auto_increment = attribute.is_some_and(|a| a.auto_increment);

            if auto_increment && value.is_null() {
                // No identity columns in this dialect: the value comes from
                // the companion trigger. Either hand the row slot to the
                // engine or leave the column out entirely.
                if !self.supports().autoincrement_default_value {
                    continue;
                }
                fields.push(self.quote_identifier(key));
                if self.supports().default_keyword {
                    rendered.push("DEFAULT".to_string());
                } else {
                    rendered.push("NULL".to_string());
                }
                continue;
            }

            if auto_increment {
                identity_wrapper_required = true;
            }
            fields.push(self.quote_identifier(key));
            rendered.push(self.render_dml_value(key, value, &mut binds)?);
        }

        let mut query = if fields.is_empty() {
            let mut q = format!("INSERT INTO {}", self.quote_table(table, None));
            if self.supports().default_values {
                q.push_str(" DEFAULT VALUES");
            }
            q
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quote_table(table, None),
                fields.join(","),
                rendered.join(",")
            )
        };

        if options.returning && self.supports().returning_into {
            if let Some(key) = model.and_then(returning_key) {
                query.push_str(&format!(
                    " RETURNING {} INTO :{RID}",
                    self.quote_identifier(key)
                ));
                binds.insert(RID, BindParam::out_number())?;
            }
        }

        if identity_wrapper_required && self.supports().identity_insert {
            query = self.identity_insert_wrapper(table, &query);
        }

        Ok(GeneratedQuery {
            sql: query,
            binds,
            kind: StatementKind::Insert,
        })
    }

    /// Build a multi-row insert as one `INSERT ALL ... SELECT * FROM dual`
    /// statement with one INTO clause per row.
    pub fn bulk_insert_query(
        &self,
        table: &TableRef,
        rows: &[Vec<(String, SqlValue)>],
    ) -> Result<GeneratedQuery> {
        // Union of row keys, in first-seen order.
        let mut all_attributes: Vec<&str> = Vec::new();
        for row in rows {
            for (key, _) in row {
                if !all_attributes.contains(&key.as_str()) {
                    all_attributes.push(key);
                }
            }
        }

        let into_clause = format!(
            "INTO {} ({})",
            self.quote_table(table, None),
            all_attributes
                .iter()
                .map(|a| self.quote_identifier(a))
                .collect::<Vec<_>>()
                .join(",")
        );

        let mut binds = BindSpec::new();
        let mut param_index = 0usize;
        let mut tuples: Vec<String> = Vec::new();
        for row in rows {
            let rendered: Vec<String> = all_attributes
                .iter()
                .map(|key| {
                    let value = row
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v)
                        .unwrap_or(&SqlValue::Null);
                    match value {
                        SqlValue::Text(s) if s.len() >= INLINE_STRING_CAP => {
                            param_index += 1;
                            let name = crate::bind::indexed_param_name(param_index);
                            let placeholder = format!(":{name}");
                            binds.insert(name, BindParam::clob(s.clone()))?;
                            Ok(placeholder)
                        }
                        other => Ok(other.to_literal()),
                    }
                })
                .collect::<Result<_>>()?;
            tuples.push(format!("{into_clause} VALUES ({})", rendered.join(",")));
        }

        Ok(GeneratedQuery {
            sql: format!("INSERT ALL {} SELECT * FROM dual", tuples.join(" ")),
            binds,
            kind: StatementKind::BulkInsert,
        })
    }

    /// Build an update with an affected-row-count out-bind.
    pub fn update_query(
        &self,
        table: &TableRef,
        values: &[(String, SqlValue)],
        filter: Option<&Filter>,
        options: &UpdateOptions,
        _model: Option<&Model>,
    ) -> Result<GeneratedQuery> {
        if options.limit.is_some_and(|l| l > 0) {
            return Err(DialectError::query(
                "Limit is not supported by update statements",
            ));
        }

        let mut binds = BindSpec::new();
        let assignments: Vec<String> = values
            .iter()
            .map(|(key, value)| {
                Ok(format!(
                    "{} = {}",
                    self.quote_identifier(key),
                    self.render_dml_value(key, value, &mut binds)?
                ))
            })
            .collect::<Result<_>>()?;

        let mut query = format!(
            "UPDATE {} SET {}",
            self.quote_table(table, None),
            assignments.join(",")
        );
        if let Some(filter) = filter {
            query.push_str(" WHERE ");
            query.push_str(&self.where_clause(filter, None));
        }
        query.push_str(&format!(" RETURNING COUNT(*) INTO :{AFFECTED_ROWS}"));
        binds.insert(AFFECTED_ROWS, BindParam::out_number())?;

        Ok(GeneratedQuery {
            sql: query,
            binds,
            kind: StatementKind::Update,
        })
    }

    /// Build a delete with an affected-row-count out-bind, or a TRUNCATE.
    pub fn delete_query(
        &self,
        table: &TableRef,
        filter: Option<&Filter>,
        options: &DeleteOptions,
    ) -> Result<GeneratedQuery> {
        if options.truncate {
            // TRUNCATE allows neither LIMIT nor WHERE.
            return Ok(GeneratedQuery {
                sql: format!("TRUNCATE TABLE {}", self.quote_table(table, None)),
                binds: BindSpec::new(),
                kind: StatementKind::Delete,
            });
        }
        if options.limit.is_some_and(|l| l > 0) {
            return Err(DialectError::query(
                "Limit is not supported by delete statements",
            ));
        }

        let mut query = format!("DELETE FROM {}", self.quote_table(table, None));
        if let Some(filter) = filter {
            query.push_str(" WHERE ");
            query.push_str(&self.where_clause(filter, None));
        }
        query.push_str(&format!(" RETURNING COUNT(*) INTO :{AFFECTED_ROWS}"));

        let mut binds = BindSpec::new();
        binds.insert(AFFECTED_ROWS, BindParam::out_number())?;

        Ok(GeneratedQuery {
            sql: query,
            binds,
            kind: StatementKind::Delete,
        })
    }

    /// Build a MERGE-based upsert keyed on primary or unique columns.
    ///
    /// The join predicate prefers primary key columns named by a fully
    /// non-null clause of `filter`, falling back to declared unique columns
    /// (unique index fields included). Autoincrement columns never appear
    /// in the UPDATE SET; an explicit non-null autoincrement update value
    /// forces identity-insert bracketing around the whole statement.
    pub fn upsert_query(
        &self,
        table: &TableRef,
        insert_values: &[(String, SqlValue)],
        update_values: &[(String, SqlValue)],
        filter: &Filter,
        model: &Model,
    ) -> Result<GeneratedQuery> {
        let target_alias = self.quote_identifier(&format!("{}_target", table.name));
        let source_alias = self.quote_identifier(&format!("{}_source", table.name));

        let primary_keys = model.primary_key_fields();
        let unique_keys = model.unique_fields();
        let identity_keys = model.auto_increment_fields();

        let need_identity_wrapper = update_values
            .iter()
            .any(|(k, v)| identity_keys.contains(&k.as_str()) && !v.is_null());

        // Clauses with any NULL value cannot identify a single row; a
        // partial composite key is just as useless.
        let clauses: Vec<Vec<(&str, &SqlValue)>> = filter
            .conjunction_clauses()
            .into_iter()
            .filter(|clause| !clause.is_empty() && clause.iter().all(|(_, v)| !v.is_null()))
            .collect();
        if clauses.is_empty() {
            return Err(DialectError::query(
                "Primary Key or Unique key should be passed to upsert query",
            ));
        }

        let join_keys: &[&str] = if clauses
            .iter()
            .any(|clause| clause.iter().any(|(k, _)| primary_keys.contains(k)))
        {
            &primary_keys
        } else {
            &unique_keys
        };
        if join_keys.is_empty() {
            return Err(DialectError::query(
                "Primary Key or Unique key should be passed to upsert query",
            ));
        }
        let join_condition = join_keys
            .iter()
            .map(|key| {
                let key = self.quote_identifier(key);
                format!("{target_alias}.{key} = {source_alias}.{key}")
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        let insert_keys = insert_values
            .iter()
            .map(|(k, _)| self.quote_identifier(k))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_rendered = insert_values
            .iter()
            .map(|(_, v)| v.to_literal())
            .collect::<Vec<_>>()
            .join(", ");

        let update_set = update_values
            .iter()
            .filter(|(k, _)| !identity_keys.contains(&k.as_str()))
            .map(|(k, v)| format!("{target_alias}.{} = {}", self.quote_identifier(k), v.to_literal()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut query = format!(
            "MERGE INTO {} {target_alias} USING (VALUES ({insert_rendered})) \
             {source_alias} ({insert_keys}) ON {join_condition} \
             WHEN MATCHED THEN UPDATE SET {update_set} \
             WHEN NOT MATCHED THEN INSERT ({insert_keys}) VALUES ({insert_rendered})",
            self.quote_table(table, None),
        );
        if need_identity_wrapper && self.supports().identity_insert {
            query = self.identity_insert_wrapper(table, &query);
        }

        Ok(GeneratedQuery {
            sql: query,
            binds: BindSpec::new(),
            kind: StatementKind::Upsert,
        })
    }

    /// Inline a DML value, promoting oversized strings to CLOB binds.
    fn render_dml_value(
        &self,
        key: &str,
        value: &SqlValue,
        binds: &mut BindSpec,
    ) -> Result<String> {
        match value {
            SqlValue::Text(s) if s.len() >= INLINE_STRING_CAP => {
                binds.insert(key, BindParam::clob(s.clone()))?;
                Ok(format!(":{key}"))
            }
            other => Ok(other.to_literal()),
        }
    }

    fn identity_insert_wrapper(&self, table: &TableRef, query: &str) -> String {
        let table = self.quote_table(table, None);
        format!("SET IDENTITY_INSERT {table} ON; {query}; SET IDENTITY_INSERT {table} OFF;")
    }
}

fn returning_key(model: &Model) -> Option<&str> {
    model
        .auto_increment_fields()
        .first()
        .copied()
        .or_else(|| model.primary_key_fields().first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Attribute, IndexSpec};
    use crate::dialect::DialectSupports;

    fn user_model() -> Model {
        Model::new("User", "users")
            .attribute("id", Attribute::new("INTEGER").primary_key().auto_increment())
            .attribute("name", Attribute::new("VARCHAR2(255)"))
            .attribute("email", Attribute::new("VARCHAR2(255)").unique())
    }

    #[test]
    fn test_insert_inlines_plain_values() {
        let gen = QueryGenerator::new();
        let q = gen
            .insert_query(
                &"users".into(),
                &[("name".to_string(), SqlValue::from("bob"))],
                Some(&user_model()),
                &InsertOptions::default(),
            )
            .unwrap();
        assert_eq!(q.sql, "INSERT INTO \"users\" (\"name\") VALUES ('bob')");
        assert!(q.binds.is_empty());
    }

    #[test]
    fn test_insert_omits_null_autoincrement_column() {
        // Oracle flags: no DEFAULT for identity columns, so the column is
        // dropped and the trigger fills it.
        let gen = QueryGenerator::new();
        let q = gen
            .insert_query(
                &"users".into(),
                &[
                    ("id".to_string(), SqlValue::Null),
                    ("name".to_string(), SqlValue::from("bob")),
                ],
                Some(&user_model()),
                &InsertOptions::default(),
            )
            .unwrap();
        assert_eq!(q.sql, "INSERT INTO \"users\" (\"name\") VALUES ('bob')");
    }

    #[test]
    fn test_insert_renders_default_when_supported() {
        let supports = DialectSupports {
            autoincrement_default_value: true,
            ..DialectSupports::oracle()
        };
        let gen = QueryGenerator::with_supports(supports);
        let q = gen
            .insert_query(
                &"users".into(),
                &[("id".to_string(), SqlValue::Null)],
                Some(&user_model()),
                &InsertOptions::default(),
            )
            .unwrap();
        assert_eq!(q.sql, "INSERT INTO \"users\" (\"id\") VALUES (DEFAULT)");
    }

    #[test]
    fn test_insert_returning_registers_rid_out_bind() {
        let gen = QueryGenerator::new();
        let q = gen
            .insert_query(
                &"users".into(),
                &[("name".to_string(), SqlValue::from("bob"))],
                Some(&user_model()),
                &InsertOptions {
                    returning: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(q.sql.ends_with(" RETURNING \"id\" INTO :rid"), "{}", q.sql);
        let rid = q.binds.get(RID).unwrap();
        assert_eq!(rid.direction, crate::bind::BindDirection::Out);
        assert_eq!(rid.ty, crate::bind::BindType::Number);
    }

    #[test]
    fn test_insert_empty_values_uses_default_values_form() {
        let gen = QueryGenerator::new();
        let q = gen
            .insert_query(&"users".into(), &[], None, &InsertOptions::default())
            .unwrap();
        assert_eq!(q.sql, "INSERT INTO \"users\" DEFAULT VALUES");
    }

    #[test]
    fn test_oversized_string_becomes_clob_bind() {
        let gen = QueryGenerator::new();
        let big = "x".repeat(4000);
        let q = gen
            .insert_query(
                &"docs".into(),
                &[("body".to_string(), SqlValue::Text(big.clone()))],
                None,
                &InsertOptions::default(),
            )
            .unwrap();
        assert!(q.sql.contains(":body"), "{}", q.sql);
        assert!(!q.sql.contains(&big));
        let bind = q.binds.get("body").unwrap();
        assert_eq!(bind.ty, crate::bind::BindType::Clob);
    }

    #[test]
    fn test_string_below_threshold_is_inlined() {
        let gen = QueryGenerator::new();
        let value = "x".repeat(3999);
        let q = gen
            .insert_query(
                &"docs".into(),
                &[("body".to_string(), SqlValue::Text(value.clone()))],
                None,
                &InsertOptions::default(),
            )
            .unwrap();
        assert!(q.sql.contains(&value));
        assert!(q.binds.is_empty());
    }

    #[test]
    fn test_explicit_identity_value_wraps_identity_insert() {
        let gen = QueryGenerator::new();
        let q = gen
            .insert_query(
                &"users".into(),
                &[("id".to_string(), SqlValue::Int(7))],
                Some(&user_model()),
                &InsertOptions::default(),
            )
            .unwrap();
        assert!(q.sql.starts_with("SET IDENTITY_INSERT \"users\" ON; "), "{}", q.sql);
        assert!(q.sql.ends_with("SET IDENTITY_INSERT \"users\" OFF;"), "{}", q.sql);
    }

    #[test]
    fn test_bulk_insert_shape_and_indexed_clob_binds() {
        let gen = QueryGenerator::new();
        let big = "y".repeat(5000);
        let rows = vec![
            vec![
                ("name".to_string(), SqlValue::from("a")),
                ("body".to_string(), SqlValue::Text(big)),
            ],
            vec![("name".to_string(), SqlValue::from("b"))],
        ];
        let q = gen.bulk_insert_query(&"docs".into(), &rows).unwrap();
        assert!(q.sql.starts_with("INSERT ALL INTO \"docs\" (\"name\",\"body\")"), "{}", q.sql);
        assert!(q.sql.ends_with("SELECT * FROM dual"), "{}", q.sql);
        assert!(q.sql.contains(":param__1"), "{}", q.sql);
        // The second row has no body value, so it renders NULL.
        assert!(q.sql.contains("VALUES ('b',NULL)"), "{}", q.sql);
        assert!(q.binds.get("param__1").is_some());
    }

    #[test]
    fn test_update_appends_affected_rows_bind() {
        let gen = QueryGenerator::new();
        let q = gen
            .update_query(
                &"users".into(),
                &[("name".to_string(), SqlValue::from("carol"))],
                Some(&Filter::eq("id", 3i64)),
                &UpdateOptions::default(),
                None,
            )
            .unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"users\" SET \"name\" = 'carol' WHERE \"id\" = 3 \
             RETURNING COUNT(*) INTO :affectedRows"
        );
        assert!(q.binds.get(AFFECTED_ROWS).is_some());
    }

    #[test]
    fn test_update_oversized_string_becomes_clob_bind() {
        let gen = QueryGenerator::new();
        let big = "z".repeat(4000);
        let q = gen
            .update_query(
                &"docs".into(),
                &[("body".to_string(), SqlValue::Text(big.clone()))],
                Some(&Filter::eq("id", 9i64)),
                &UpdateOptions::default(),
                None,
            )
            .unwrap();
        assert!(q.sql.contains("SET \"body\" = :body"), "{}", q.sql);
        assert!(!q.sql.contains(&big));
        let bind = q.binds.get("body").unwrap();
        assert_eq!(bind.ty, crate::bind::BindType::Clob);
        assert!(q.binds.get(AFFECTED_ROWS).is_some());
    }

    #[test]
    fn test_update_with_limit_fails_fast() {
        let gen = QueryGenerator::new();
        let err = gen
            .update_query(
                &"users".into(),
                &[("name".to_string(), SqlValue::from("x"))],
                None,
                &UpdateOptions { limit: Some(1) },
                None,
            )
            .unwrap_err();
        assert!(err.to_string().contains("Limit is not supported"));
    }

    #[test]
    fn test_delete_with_limit_fails_fast() {
        let gen = QueryGenerator::new();
        let err = gen
            .delete_query(
                &"users".into(),
                None,
                &DeleteOptions {
                    limit: Some(10),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("Limit is not supported"));
    }

    #[test]
    fn test_delete_truncate_form() {
        let gen = QueryGenerator::new();
        let q = gen
            .delete_query(
                &"users".into(),
                Some(&Filter::eq("id", 1i64)),
                &DeleteOptions {
                    truncate: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(q.sql, "TRUNCATE TABLE \"users\"");
        assert!(q.binds.is_empty());
    }

    #[test]
    fn test_upsert_requires_resolvable_key() {
        let gen = QueryGenerator::new();
        // All-null clause: cannot identify a row.
        let filter = Filter::or(vec![Filter::eq("id", SqlValue::Null)]);
        let err = gen
            .upsert_query(
                &"users".into(),
                &[("name".to_string(), SqlValue::from("a"))],
                &[("name".to_string(), SqlValue::from("a"))],
                &filter,
                &user_model(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Primary Key or Unique key"));
    }

    #[test]
    fn test_upsert_joins_on_primary_key_and_skips_identity_update() {
        let gen = QueryGenerator::new();
        let q = gen
            .upsert_query(
                &"users".into(),
                &[
                    ("id".to_string(), SqlValue::Int(1)),
                    ("name".to_string(), SqlValue::from("a")),
                ],
                &[
                    ("id".to_string(), SqlValue::Null),
                    ("name".to_string(), SqlValue::from("a")),
                ],
                &Filter::eq("id", 1i64),
                &user_model(),
            )
            .unwrap();
        assert!(
            q.sql.contains("ON \"users_target\".\"id\" = \"users_source\".\"id\""),
            "{}",
            q.sql
        );
        // Identity column stays out of the UPDATE SET but may be inserted.
        assert!(!q.sql.contains("UPDATE SET \"users_target\".\"id\""), "{}", q.sql);
        assert!(q.sql.contains("WHEN NOT MATCHED THEN INSERT (\"id\", \"name\")"), "{}", q.sql);
        assert!(!q.sql.starts_with("SET IDENTITY_INSERT"));
    }

    #[test]
    fn test_upsert_falls_back_to_unique_columns() {
        let gen = QueryGenerator::new();
        let q = gen
            .upsert_query(
                &"users".into(),
                &[("email".to_string(), SqlValue::from("a@b.c"))],
                &[("email".to_string(), SqlValue::from("a@b.c"))],
                &Filter::eq("email", "a@b.c"),
                &user_model(),
            )
            .unwrap();
        assert!(
            q.sql.contains("ON \"users_target\".\"email\" = \"users_source\".\"email\""),
            "{}",
            q.sql
        );
    }

    #[test]
    fn test_upsert_uses_unique_index_fields() {
        let gen = QueryGenerator::new();
        let mut model = Model::new("Tag", "tags")
            .attribute("label", Attribute::new("VARCHAR2(64)"));
        model.indexes.push(IndexSpec {
            name: Some("tags_label_uniq".into()),
            unique: true,
            fields: vec!["label".into()],
        });
        let q = gen
            .upsert_query(
                &"tags".into(),
                &[("label".to_string(), SqlValue::from("x"))],
                &[("label".to_string(), SqlValue::from("x"))],
                &Filter::eq("label", "x"),
                &model,
            )
            .unwrap();
        assert!(
            q.sql.contains("ON \"tags_target\".\"label\" = \"tags_source\".\"label\""),
            "{}",
            q.sql
        );
    }

    #[test]
    fn test_upsert_identity_update_value_brackets_identity_insert() {
        let gen = QueryGenerator::new();
        let q = gen
            .upsert_query(
                &"users".into(),
                &[("id".to_string(), SqlValue::Int(5))],
                &[("id".to_string(), SqlValue::Int(5))],
                &Filter::eq("id", 5i64),
                &user_model(),
            )
            .unwrap();
        assert!(q.sql.starts_with("SET IDENTITY_INSERT \"users\" ON;"), "{}", q.sql);
    }
}
