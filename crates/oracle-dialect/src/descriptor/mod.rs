//! Query descriptor types consumed by the generator.
//!
//! These structures are supplied by the host model layer: table references,
//! requested attributes, a filter tree, a join/include tree, ordering and
//! pagination. The generator reads them; it never mutates model metadata.

mod filter;
mod model;

pub use filter::{CmpOp, Filter};
pub use model::{Attribute, AttributeType, IndexSpec, Model, Reference, TableRef, UniqueKey};

use serde::{Deserialize, Serialize};

/// One projected attribute in a select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// A plain column, quoted and prefixed with the owning alias.
    Column(String),
    /// A column selected under a different name.
    Aliased { column: String, alias: String },
    /// Raw SQL passed through verbatim; the caller owns its correctness.
    Literal(String),
}

impl Projection {
    pub fn column(name: impl Into<String>) -> Self {
        Projection::Column(name.into())
    }

    pub fn aliased(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Projection::Aliased {
            column: column.into(),
            alias: alias.into(),
        }
    }
}

/// How an included model relates to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    /// Many-to-many through an association table.
    BelongsToMany,
}

impl AssociationKind {
    /// True when the association can produce several rows per parent row,
    /// which is what forces subquery mode under a limit.
    pub fn is_multi(self) -> bool {
        matches!(
            self,
            AssociationKind::HasMany | AssociationKind::BelongsToMany
        )
    }
}

/// Join predicate metadata for a direct (non-through) association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub kind: AssociationKind,
    /// Column on the parent side of the join predicate.
    pub source_attribute: String,
    /// Column on the included side of the join predicate.
    pub target_attribute: String,
}

/// Association-table hop of a many-to-many include.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Through {
    pub model: Model,
    /// Alias for the association table; composed under the parent alias.
    pub as_name: String,
    /// Attributes to project from the association table.
    pub attributes: Vec<Projection>,
    /// Foreign-identifier column in the association table referencing the
    /// source (parent) primary key.
    pub source_identifier: String,
    /// Foreign-identifier column referencing the target primary key.
    pub target_identifier: String,
    pub filter: Option<Filter>,
}

/// One node of the include (join) tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinNode {
    pub model: Model,
    /// Alias, unique within its join-tree scope.
    pub as_name: String,
    pub attributes: Vec<Projection>,
    /// INNER JOIN when true, LEFT OUTER JOIN otherwise.
    pub required: bool,
    /// True when the join belongs to the wrapped inner query rather than
    /// the outer query.
    pub sub_query: bool,
    pub association: Association,
    pub through: Option<Through>,
    pub filter: Option<Filter>,
    pub include: Vec<JoinNode>,
}

impl JoinNode {
    pub fn new(model: Model, as_name: impl Into<String>, association: Association) -> Self {
        JoinNode {
            model,
            as_name: as_name.into(),
            attributes: Vec::new(),
            required: false,
            sub_query: false,
            association,
            through: None,
            filter: None,
            include: Vec::new(),
        }
    }

    /// True when this include or any nested include is a multi association.
    pub fn has_multi_association(&self) -> bool {
        self.association.kind.is_multi() || self.include.iter().any(JoinNode::has_multi_association)
    }
}

/// Allowed order direction tokens. Anything else is rejected.
const ORDER_DIRECTIONS: &[&str] = &[
    "ASC",
    "DESC",
    "ASC NULLS LAST",
    "DESC NULLS LAST",
    "ASC NULLS FIRST",
    "DESC NULLS FIRST",
    "NULLS FIRST",
    "NULLS LAST",
];

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Column name, or raw SQL when `literal` is set.
    pub expr: String,
    /// Owning table alias; column-only items also apply to the inner query
    /// in subquery mode.
    pub table: Option<String>,
    /// Direction token, validated against the fixed allow-list.
    pub direction: Option<String>,
    pub literal: bool,
}

impl OrderItem {
    pub fn column(expr: impl Into<String>, direction: Option<&str>) -> Self {
        OrderItem {
            expr: expr.into(),
            table: None,
            direction: direction.map(str::to_string),
            literal: false,
        }
    }

    pub fn literal(expr: impl Into<String>) -> Self {
        OrderItem {
            expr: expr.into(),
            table: None,
            direction: None,
            literal: true,
        }
    }

    /// Validate the direction token. Literal items are the caller's problem.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.literal {
            return Ok(());
        }
        if let Some(dir) = &self.direction {
            let upper = dir.to_uppercase();
            if !ORDER_DIRECTIONS.contains(&upper.as_str()) {
                return Err(crate::error::DialectError::query(format!(
                    "Order must be 'ASC' or 'DESC', '{dir}' given"
                )));
            }
        }
        Ok(())
    }
}

/// Full select descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectOptions {
    /// Requested attributes; `None` selects `*` (or `alias.*` with includes).
    pub attributes: Option<Vec<Projection>>,
    pub filter: Option<Filter>,
    pub include: Vec<JoinNode>,
    pub group: Vec<String>,
    pub having: Option<Filter>,
    pub order: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Alias for the main table.
    pub table_as: Option<String>,
    /// Forces or suppresses subquery mode; `None` derives it from
    /// limit + multi-association.
    pub sub_query: Option<bool>,
    /// When false, include nodes contribute joins but no projected
    /// attributes (used by aggregates and synthesized existence checks).
    pub include_attributes: bool,
    /// Row-lock request; ignored because the dialect does not support it.
    pub lock: bool,
}

impl SelectOptions {
    pub fn new() -> Self {
        SelectOptions {
            include_attributes: true,
            ..Default::default()
        }
    }

    /// Whether the descriptor needs the two-level subquery form.
    pub fn needs_sub_query(&self) -> bool {
        match self.sub_query {
            Some(explicit) => explicit,
            None => {
                self.limit.is_some() && self.include.iter().any(JoinNode::has_multi_association)
            }
        }
    }
}
