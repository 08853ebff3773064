//! Named bind parameters with explicit direction and type.
//!
//! The driver consumes these as `{direction, type, value}` descriptors.
//! Three names are reserved by the generator: [`RID`] carries a generated
//! key back out of an insert, [`AFFECTED_ROWS`] carries the row count out
//! of an update/delete, and `param__N` names indexed large-object in-binds
//! produced by bulk inserts.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{DialectError, Result};
use crate::value::SqlValue;

/// Reserved out-bind name for a generated key.
pub const RID: &str = "rid";

/// Reserved out-bind name for the affected-row count.
pub const AFFECTED_ROWS: &str = "affectedRows";

/// Name of the Nth indexed large-object bind (1-based).
pub fn indexed_param_name(index: usize) -> String {
    format!("param__{index}")
}

/// Direction a parameter travels across the driver boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindDirection {
    In,
    Out,
}

/// Semantic type of a bind parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindType {
    Number,
    Date,
    Varchar,
    /// Out-of-line large object; the only legal form for strings at or
    /// above the inline-literal cap.
    Clob,
}

/// One named bind parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindParam {
    pub direction: BindDirection,
    pub ty: BindType,
    /// In-bound value; `None` for out-binds.
    pub value: Option<SqlValue>,
}

impl BindParam {
    /// Numeric out-bind, used for `rid` and `affectedRows`.
    pub fn out_number() -> Self {
        BindParam {
            direction: BindDirection::Out,
            ty: BindType::Number,
            value: None,
        }
    }

    /// Large-object in-bind for an oversized string.
    pub fn clob(value: impl Into<String>) -> Self {
        BindParam {
            direction: BindDirection::In,
            ty: BindType::Clob,
            value: Some(SqlValue::Text(value.into())),
        }
    }

    /// In-bind with the type inferred from the value: numeric types map to
    /// Number, timestamps to Date, everything else to Varchar.
    pub fn infer(value: SqlValue) -> Self {
        let ty = match &value {
            SqlValue::Int(_) | SqlValue::Float(_) | SqlValue::Bool(_) => BindType::Number,
            SqlValue::Date(_) => BindType::Date,
            SqlValue::Text(_) | SqlValue::Null => BindType::Varchar,
        };
        BindParam {
            direction: BindDirection::In,
            ty,
            value: Some(value),
        }
    }
}

impl From<NaiveDateTime> for BindParam {
    fn from(v: NaiveDateTime) -> Self {
        BindParam::infer(SqlValue::Date(v))
    }
}

/// Ordered set of named bind parameters for one statement.
///
/// Names are unique per statement; inserting a duplicate is an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindSpec {
    params: Vec<(String, BindParam)>,
}

impl BindSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Add a parameter, rejecting duplicate names.
    pub fn insert(&mut self, name: impl Into<String>, param: BindParam) -> Result<()> {
        let name = name.into();
        if self.params.iter().any(|(n, _)| *n == name) {
            return Err(DialectError::query(format!(
                "duplicate bind parameter name: {name}"
            )));
        }
        self.params.push((name, param));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BindParam> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindParam)> {
        self.params.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Build a spec of plain in-binds with inferred types.
    pub fn from_values<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, SqlValue)>,
        S: Into<String>,
    {
        let mut spec = BindSpec::new();
        for (name, value) in values {
            spec.insert(name, BindParam::infer(value))?;
        }
        Ok(spec)
    }
}
