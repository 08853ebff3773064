//! Filter tree for WHERE and HAVING clauses.
//!
//! Rendering to SQL happens in the generator; this module only carries the
//! shape plus the clause decomposition the upsert key resolver needs.

use serde::{Deserialize, Serialize};

use crate::value::SqlValue;

/// Comparison operator of a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl CmpOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Like => "LIKE",
        }
    }
}

/// A boolean filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Cmp {
        column: String,
        op: CmpOp,
        value: SqlValue,
    },
    In {
        column: String,
        values: Vec<SqlValue>,
    },
    IsNull(String),
    NotNull(String),
    /// Raw predicate text, passed through verbatim.
    Literal(String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Cmp {
            column: column.into(),
            op: CmpOp::Eq,
            value: value.into(),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Append another predicate with AND, flattening where possible.
    pub fn push_and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut items) => {
                items.push(other);
                Filter::And(items)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Decompose into conjunction clauses of column/value pairs, as used by
    /// upsert key resolution: an `Or` of conjunctions yields one clause per
    /// branch, a plain conjunction yields one clause. Branches containing
    /// anything other than equality predicates yield no clause.
    pub fn conjunction_clauses(&self) -> Vec<Vec<(&str, &SqlValue)>> {
        fn clause_of(filter: &Filter) -> Option<Vec<(&str, &SqlValue)>> {
            match filter {
                Filter::Cmp {
                    column,
                    op: CmpOp::Eq,
                    value,
                } => Some(vec![(column.as_str(), value)]),
                Filter::And(items) => {
                    let mut pairs = Vec::new();
                    for item in items {
                        pairs.extend(clause_of(item)?);
                    }
                    Some(pairs)
                }
                _ => None,
            }
        }

        match self {
            Filter::Or(branches) => branches.iter().filter_map(clause_of).collect(),
            other => clause_of(other).into_iter().collect(),
        }
    }
}
