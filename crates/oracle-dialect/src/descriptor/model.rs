//! Model and association metadata, read-only from the host model layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::SqlValue;

/// A table reference, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        TableRef {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        TableRef {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::new(name)
    }
}

/// Foreign key target of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub table: TableRef,
    /// Referenced column; defaults to `id` when absent.
    pub key: Option<String>,
    /// `ON DELETE` action. The dialect has no `ON UPDATE` action.
    pub on_delete: Option<String>,
}

/// Column type as declared by the model layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeType {
    /// Raw SQL type text (`NUMBER(10)`, `VARCHAR2(255)`, `TEXT`, ...).
    Plain(String),
    /// Enumerated values, rendered as a sized VARCHAR2 with a CHECK
    /// constraint.
    Enum(Vec<String>),
}

impl AttributeType {
    pub fn plain(ty: impl Into<String>) -> Self {
        AttributeType::Plain(ty.into())
    }

    /// Blob/text types cannot carry a default value clause.
    pub fn is_lob(&self) -> bool {
        match self {
            AttributeType::Plain(ty) => {
                let upper = ty.to_uppercase();
                upper == "TEXT" || upper.contains("BLOB") || upper.contains("CLOB")
            }
            AttributeType::Enum(_) => false,
        }
    }
}

/// One model attribute (column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub ty: AttributeType,
    /// Database column name when it differs from the attribute name.
    pub field: Option<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub allow_null: bool,
    pub default_value: Option<SqlValue>,
    pub references: Option<Reference>,
}

impl Attribute {
    pub fn new(ty: impl Into<String>) -> Self {
        Attribute {
            ty: AttributeType::Plain(ty.into()),
            field: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
            allow_null: true,
            default_value: None,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }
}

/// A declared unique key, used to map violated constraints back to fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueKey {
    pub fields: Vec<String>,
    /// Custom validation message, surfaced instead of the generic one.
    pub msg: Option<String>,
}

/// A declared index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: Option<String>,
    pub unique: bool,
    pub fields: Vec<String>,
}

/// Model metadata: table, attributes, keys. Never mutated by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub table: TableRef,
    /// Attribute name → definition, in declaration order.
    pub attributes: Vec<(String, Attribute)>,
    /// Constraint name → unique key declaration.
    pub unique_keys: BTreeMap<String, UniqueKey>,
    pub indexes: Vec<IndexSpec>,
}

impl Model {
    pub fn new(name: impl Into<String>, table: impl Into<TableRef>) -> Self {
        Model {
            name: name.into(),
            table: table.into(),
            attributes: Vec::new(),
            unique_keys: BTreeMap::new(),
            indexes: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.push((name.into(), attr));
        self
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|(n, a)| n == name || a.field.as_deref() == Some(name))
            .map(|(_, a)| a)
    }

    /// Column name for an attribute, honoring field renames.
    pub fn field_of<'a>(&'a self, name: &'a str) -> &'a str {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, a)| a.field.as_deref())
            .unwrap_or(name)
    }

    /// Primary key column names.
    pub fn primary_key_fields(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.primary_key)
            .map(|(n, a)| a.field.as_deref().unwrap_or(n.as_str()))
            .collect()
    }

    /// Autoincrement column names.
    pub fn auto_increment_fields(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.auto_increment)
            .map(|(n, a)| a.field.as_deref().unwrap_or(n.as_str()))
            .collect()
    }

    /// Unique column names: declared unique attributes plus fields named by
    /// unique index declarations.
    pub fn unique_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .attributes
            .iter()
            .filter(|(_, a)| a.unique)
            .map(|(n, a)| a.field.as_deref().unwrap_or(n.as_str()))
            .collect();
        for index in self.indexes.iter().filter(|i| i.unique) {
            for field in &index.fields {
                if !fields.contains(&field.as_str()) && self.get_attribute(field).is_some() {
                    fields.push(field.as_str());
                }
            }
        }
        fields
    }

    /// The first autoincrement attribute name, used to report generated ids.
    pub fn auto_increment_attribute(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(_, a)| a.auto_increment)
            .map(|(n, _)| n.as_str())
    }
}
