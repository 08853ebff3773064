//! DDL generation: idempotent create/drop blocks and column definitions.
//!
//! The dialect has no `CREATE TABLE IF NOT EXISTS` and no identity columns.
//! Creation is wrapped in a PL/SQL block that swallows the "name already
//! used" condition, and every autoincrement column gets a companion
//! sequence plus a before-insert trigger assigning `NEXTVAL`.

use crate::descriptor::{Attribute, AttributeType, TableRef};
use crate::dialect::MAX_IDENTIFIER_LENGTH;
use crate::error::{DialectError, Result};

use super::{random_suffix, QueryGenerator};

/// ORA-00955: name is already used by an existing object.
const OBJECT_EXISTS: &str = "-00955";
/// ORA-04081: trigger already exists.
const TRIGGER_EXISTS: &str = "-04081";
/// ORA-00942: table or view does not exist.
const TABLE_MISSING: &str = "-00942";

/// Options for table creation.
#[derive(Debug, Clone, Default)]
pub struct CreateTableOptions {
    pub comment: Option<String>,
}

impl QueryGenerator {
    /// Emit an idempotent create-table block.
    ///
    /// `attributes` pairs column names with rendered definitions (see
    /// [`QueryGenerator::attribute_to_sql`]); the markers `auto_increment`,
    /// `PRIMARY KEY` and `REFERENCES` are lifted out of the definition text
    /// into sequence/trigger companions and table-level constraint clauses.
    pub fn create_table_query(
        &self,
        table: &TableRef,
        attributes: &[(String, String)],
        options: &CreateTableOptions,
    ) -> Result<String> {
        let mut primary_keys: Vec<&str> = Vec::new();
        let mut auto_increment_keys: Vec<&str> = Vec::new();
        let mut foreign_keys: Vec<(&str, String)> = Vec::new();
        let mut columns: Vec<String> = Vec::new();

        for (name, definition) in attributes {
            let mut data_type = definition.clone();

            if data_type.contains("auto_increment") {
                auto_increment_keys.push(name);
                data_type = data_type.replace("auto_increment", "");
            }
            if data_type.contains("PRIMARY KEY") {
                primary_keys.push(name);
                data_type = data_type.replace("PRIMARY KEY", "");
            }
            if let Some(pos) = data_type.find("REFERENCES") {
                foreign_keys.push((name, data_type[pos..].trim().to_string()));
                data_type.truncate(pos);
            }

            columns.push(format!(
                "{} {}",
                self.quote_identifier(name),
                collapse_spaces(&data_type)
            ));
        }

        let mut attributes_sql = columns.join(", ");
        if !primary_keys.is_empty() {
            let pks = primary_keys
                .iter()
                .map(|pk| self.quote_identifier(pk))
                .collect::<Vec<_>>()
                .join(", ");
            attributes_sql.push_str(&format!(", PRIMARY KEY ({pks})"));
        }
        for (name, clause) in &foreign_keys {
            attributes_sql.push_str(&format!(
                ", FOREIGN KEY ({}) {clause}",
                self.quote_identifier(name)
            ));
        }

        let mut sequences = String::new();
        let mut triggers = String::new();
        for column in &auto_increment_keys {
            let base = self.generated_object_base(&table.name, column);
            let sequence = self.quote_identifier(&format!("{base}_SEQ"));
            let trigger = self.quote_identifier(&format!("{base}_TRG"));
            sequences.push_str(&format!(
                "\n\n  DECLARE\n    e_sequence_exists EXCEPTION;\n    \
                 PRAGMA EXCEPTION_INIT(e_sequence_exists, {OBJECT_EXISTS});\n  BEGIN\n    \
                 EXECUTE IMMEDIATE ('CREATE SEQUENCE {sequence} START WITH 1 INCREMENT BY 1 NOCACHE NOCYCLE');\n  \
                 EXCEPTION\n    WHEN e_sequence_exists\n    THEN NULL;\n  END;"
            ));
            triggers.push_str(&format!(
                "\n\n  DECLARE\n    e_trigger_exists EXCEPTION;\n    \
                 PRAGMA EXCEPTION_INIT(e_trigger_exists, {TRIGGER_EXISTS});\n  BEGIN\n    \
                 EXECUTE IMMEDIATE ('CREATE TRIGGER {trigger}\n      BEFORE INSERT ON {table_sql}\n      \
                 FOR EACH ROW\n      BEGIN\n        :new.{column_sql} := {sequence}.NEXTVAL;\n      END;\n    ');\n  \
                 EXCEPTION\n    WHEN e_trigger_exists\n    THEN NULL;\n  END;",
                table_sql = self.quote_table(table, None),
                column_sql = self.quote_identifier(column),
            ));
        }

        let comment = match &options.comment {
            Some(text) => format!(" COMMENT '{text}'"),
            None => String::new(),
        };

        Ok(format!(
            "DECLARE\n  e_table_exists EXCEPTION;\n  \
             PRAGMA EXCEPTION_INIT(e_table_exists, {OBJECT_EXISTS});\nBEGIN\n\n  \
             EXECUTE IMMEDIATE ('CREATE TABLE {} ({}){}');{}{}\n\nEXCEPTION\n  \
             WHEN e_table_exists\n    THEN NULL;\nEND;",
            self.quote_table(table, None),
            attributes_sql.replace('\'', "''"),
            comment.replace('\'', "''"),
            sequences,
            triggers,
        ))
    }

    /// Idempotent drop, swallowing "table does not exist".
    pub fn drop_table_query(&self, table: &TableRef, cascade: bool) -> String {
        format!(
            "DECLARE\n  e_table_non_exists EXCEPTION;\n  \
             PRAGMA EXCEPTION_INIT(e_table_non_exists, {TABLE_MISSING});\nBEGIN\n  \
             EXECUTE IMMEDIATE ('DROP TABLE {}{}');\nEXCEPTION\n  \
             WHEN e_table_non_exists\n  THEN NULL;\nEND;",
            self.quote_table(table, None),
            if cascade { " CASCADE CONSTRAINTS" } else { "" }
        )
    }

    /// Base name of a generated sequence/trigger pair, `TABLE_COLUMN`
    /// uppercased. With the `_SEQ`/`_TRG` suffix the whole name must fit
    /// the identifier limit; an over-long table part is truncated and
    /// finished with a short random suffix to stay unique.
    fn generated_object_base(&self, table: &str, column: &str) -> String {
        let table = table.to_uppercase();
        let column = column.to_uppercase();
        let available = MAX_IDENTIFIER_LENGTH.saturating_sub(5 + column.chars().count());
        let table_part = if table.chars().count() > available {
            let keep = available.saturating_sub(6);
            let head: String = table.chars().take(keep).collect();
            format!("{head}_{}", random_suffix())
        } else {
            table
        };
        let base = format!("{table_part}_{column}");
        // An over-long column name can still blow the limit on its own.
        base.chars().take(MAX_IDENTIFIER_LENGTH - 4).collect()
    }

    /// Render one column definition from model attribute metadata.
    ///
    /// The output is the marker-bearing text [`create_table_query`]
    /// consumes: the `auto_increment` and `PRIMARY KEY` markers are lifted
    /// out again there.
    ///
    /// [`create_table_query`]: QueryGenerator::create_table_query
    pub fn attribute_to_sql(&self, attribute: &Attribute, name: &str) -> Result<String> {
        let mut template = match &attribute.ty {
            AttributeType::Enum(values) => {
                if values.is_empty() {
                    return Err(DialectError::query("Values for ENUM haven't been defined."));
                }
                let len = values.iter().map(String::len).max().unwrap_or(1).max(1);
                let list = values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "VARCHAR2({len}) CHECK ({} IN ({list}))",
                    self.quote_identifier(name)
                )
            }
            AttributeType::Plain(ty) => ty.clone(),
        };

        if !attribute.allow_null {
            template.push_str(" NOT NULL");
        }
        if attribute.auto_increment {
            template.push_str(" auto_increment");
        }
        // NOT NULL and DEFAULT cannot be combined, and blob/text columns
        // cannot carry a default at all.
        if attribute.allow_null && !attribute.ty.is_lob() {
            if let Some(default) = &attribute.default_value {
                template.push_str(" DEFAULT ");
                template.push_str(&default.to_literal());
            }
        }
        if attribute.unique {
            template.push_str(" UNIQUE");
        }
        if attribute.primary_key {
            template.push_str(" PRIMARY KEY");
        }
        if let Some(reference) = &attribute.references {
            template.push_str(" REFERENCES ");
            template.push_str(&self.quote_table(&reference.table, None));
            let key = reference.key.as_deref().unwrap_or("id");
            template.push_str(&format!(" ({})", self.quote_identifier(key)));
            if let Some(action) = &reference.on_delete {
                template.push_str(" ON DELETE ");
                template.push_str(&action.to_uppercase());
            }
            // The dialect has no ON UPDATE action.
        }

        Ok(template)
    }

    /// Render a whole attribute map, keyed by resolved column name.
    pub fn attributes_to_sql(
        &self,
        attributes: &[(String, Attribute)],
    ) -> Result<Vec<(String, String)>> {
        attributes
            .iter()
            .map(|(name, attr)| {
                let field = attr.field.clone().unwrap_or_else(|| name.clone());
                Ok((field, self.attribute_to_sql(attr, name)?))
            })
            .collect()
    }
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Reference;
    use crate::value::SqlValue;

    #[test]
    fn test_create_table_emits_sequence_and_trigger() {
        let gen = QueryGenerator::new();
        let sql = gen
            .create_table_query(
                &"t".into(),
                &[("id".to_string(), "INTEGER auto_increment PRIMARY KEY".to_string())],
                &CreateTableOptions::default(),
            )
            .unwrap();

        assert!(sql.contains("PRAGMA EXCEPTION_INIT(e_table_exists, -00955)"), "{sql}");
        assert!(sql.contains("CREATE TABLE \"t\" (\"id\" INTEGER, PRIMARY KEY (\"id\"))"), "{sql}");
        assert!(sql.contains("CREATE SEQUENCE \"T_ID_SEQ\" START WITH 1 INCREMENT BY 1"), "{sql}");
        assert!(sql.contains("CREATE TRIGGER \"T_ID_TRG\""), "{sql}");
        assert!(sql.contains(":new.\"id\" := \"T_ID_SEQ\".NEXTVAL"), "{sql}");
        assert!(sql.contains("PRAGMA EXCEPTION_INIT(e_trigger_exists, -04081)"), "{sql}");
    }

    #[test]
    fn test_create_table_hoists_references() {
        let gen = QueryGenerator::new();
        let sql = gen
            .create_table_query(
                &"tasks".into(),
                &[
                    ("id".to_string(), "INTEGER PRIMARY KEY".to_string()),
                    (
                        "user_id".to_string(),
                        "INTEGER REFERENCES \"users\" (\"id\")".to_string(),
                    ),
                ],
                &CreateTableOptions::default(),
            )
            .unwrap();
        assert!(
            sql.contains(", FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\")"),
            "{sql}"
        );
    }

    #[test]
    fn test_generated_object_names_fit_identifier_limit() {
        let gen = QueryGenerator::new();
        let base = gen.generated_object_base("a_very_long_table_name_indeed_yes", "id");
        assert!(base.len() + 4 <= MAX_IDENTIFIER_LENGTH, "{base}");
        assert!(base.ends_with("_ID"));
    }

    #[test]
    fn test_short_names_are_not_truncated() {
        let gen = QueryGenerator::new();
        assert_eq!(gen.generated_object_base("t", "id"), "T_ID");
    }

    #[test]
    fn test_non_ascii_table_name_truncates_on_char_boundary() {
        let gen = QueryGenerator::new();
        let base = gen.generated_object_base("commandes_archivées_détaillées", "id");
        assert!(base.chars().count() + 4 <= MAX_IDENTIFIER_LENGTH, "{base}");
        assert!(base.ends_with("_ID"));
    }

    #[test]
    fn test_over_long_column_name_is_clamped() {
        let gen = QueryGenerator::new();
        let base = gen.generated_object_base("t", "a_truly_unreasonably_long_column_name");
        assert!(base.chars().count() + 4 <= MAX_IDENTIFIER_LENGTH, "{base}");
    }

    #[test]
    fn test_drop_table_query_idempotent_block() {
        let gen = QueryGenerator::new();
        let sql = gen.drop_table_query(&"t".into(), true);
        assert!(sql.contains("PRAGMA EXCEPTION_INIT(e_table_non_exists, -00942)"));
        assert!(sql.contains("DROP TABLE \"t\" CASCADE CONSTRAINTS"));
    }

    #[test]
    fn test_attribute_to_sql_full_definition() {
        let gen = QueryGenerator::new();
        let attr = Attribute {
            references: Some(Reference {
                table: "users".into(),
                key: None,
                on_delete: Some("cascade".into()),
            }),
            ..Attribute::new("INTEGER").not_null()
        };
        assert_eq!(
            gen.attribute_to_sql(&attr, "user_id").unwrap(),
            "INTEGER NOT NULL REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_attribute_default_excluded_for_not_null() {
        let gen = QueryGenerator::new();
        let mut attr = Attribute::new("VARCHAR2(10)").not_null();
        attr.default_value = Some(SqlValue::from("x"));
        assert_eq!(
            gen.attribute_to_sql(&attr, "v").unwrap(),
            "VARCHAR2(10) NOT NULL"
        );

        attr.allow_null = true;
        assert_eq!(
            gen.attribute_to_sql(&attr, "v").unwrap(),
            "VARCHAR2(10) DEFAULT 'x'"
        );
    }

    #[test]
    fn test_attribute_default_excluded_for_lob() {
        let gen = QueryGenerator::new();
        let mut attr = Attribute::new("TEXT");
        attr.default_value = Some(SqlValue::from("x"));
        assert_eq!(gen.attribute_to_sql(&attr, "notes").unwrap(), "TEXT");
    }

    #[test]
    fn test_enum_attribute_renders_check_constraint() {
        let gen = QueryGenerator::new();
        let attr = Attribute {
            ty: AttributeType::Enum(vec!["active".into(), "archived".into()]),
            ..Attribute::new("")
        };
        assert_eq!(
            gen.attribute_to_sql(&attr, "state").unwrap(),
            "VARCHAR2(8) CHECK (\"state\" IN ('active', 'archived'))"
        );
    }

    #[test]
    fn test_enum_without_values_is_an_error() {
        let gen = QueryGenerator::new();
        let attr = Attribute {
            ty: AttributeType::Enum(vec![]),
            ..Attribute::new("")
        };
        assert!(gen.attribute_to_sql(&attr, "state").is_err());
    }
}
