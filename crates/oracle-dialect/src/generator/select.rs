//! SELECT generation: flat queries, two-level subqueries, join trees,
//! existence checks and ROWNUM pagination emulation.

use std::collections::HashSet;

use crate::descriptor::{JoinNode, Model, OrderItem, Projection, SelectOptions, TableRef};
use crate::error::{DialectError, Result};

use super::{GeneratedQuery, QueryGenerator, StatementKind};

/// Join clauses and projected attributes produced by one include subtree,
/// split by destination query level.
#[derive(Debug, Default)]
struct JoinQueries {
    main_joins: Vec<String>,
    sub_joins: Vec<String>,
    main_attrs: Vec<String>,
    sub_attrs: Vec<String>,
    /// Synthesized existence-check predicates for the outer WHERE.
    outer_where: Vec<String>,
}

impl JoinQueries {
    fn merge(&mut self, other: JoinQueries) {
        self.main_joins.extend(other.main_joins);
        self.sub_joins.extend(other.sub_joins);
        self.main_attrs.extend(other.main_attrs);
        self.sub_attrs.extend(other.sub_attrs);
        self.outer_where.extend(other.outer_where);
    }
}

impl QueryGenerator {
    /// Build a select statement for `table` described by `options`.
    ///
    /// A two-level query is used when the descriptor carries a limit and a
    /// multi-row association: the joins would duplicate parent rows and
    /// break pagination, so the main table is paginated in a wrapped inner
    /// query and multi joins stay outside. Pagination is applied as the
    /// last transform, exactly once.
    pub fn select_query(
        &self,
        table: &TableRef,
        options: &SelectOptions,
        model: &Model,
    ) -> Result<GeneratedQuery> {
        let sub_query = options.needs_sub_query();
        let main_as = options.table_as.clone().unwrap_or_else(|| model.name.clone());
        let quoted_main_as = self.quote_identifier(&main_as);

        self.check_alias_uniqueness(&options.include)?;

        // Resolve the projected attribute list. In subquery mode the inner
        // query needs the primary key even when the caller did not ask for
        // it, so the outer joins have something to correlate on.
        let mut requested = options.attributes.clone();
        if sub_query {
            if let Some(attrs) = &mut requested {
                for pk in model.primary_key_fields() {
                    let present = attrs.iter().any(|a| match a {
                        Projection::Column(c) => c == pk,
                        Projection::Aliased { column, alias } => column == pk || alias == pk,
                        Projection::Literal(_) => false,
                    });
                    if !present {
                        attrs.push(Projection::Column(pk.to_string()));
                    }
                }
            }
        }

        let mut main_attrs: Vec<String> = match &requested {
            Some(attrs) => attrs.iter().map(|a| self.render_projection(a, None)).collect(),
            None if !options.include.is_empty() => vec![format!("{quoted_main_as}.*")],
            None => vec!["*".to_string()],
        };

        // Subquery mode: the inner query selects the resolved list, the
        // outer query defaults to everything the inner produced.
        let mut sub_attrs: Vec<String> = Vec::new();
        if sub_query {
            sub_attrs = std::mem::replace(&mut main_attrs, vec![format!("{quoted_main_as}.*")]);
        }

        // Walk the include tree.
        let mut joins = JoinQueries::default();
        for node in &options.include {
            let built = self.generate_join_queries(
                node, &main_as, &main_as, model, options, sub_query, false,
            )?;
            joins.merge(built);
        }
        main_attrs.extend(joins.main_attrs);
        sub_attrs.extend(joins.sub_attrs);

        let table_sql = self.quote_table(table, None);

        // Inner (or only) query body.
        let mut inner = String::new();
        let (attrs, join_list) = if sub_query {
            (&sub_attrs, &joins.sub_joins)
        } else {
            (&main_attrs, &joins.main_joins)
        };
        inner.push_str("SELECT ");
        inner.push_str(&attrs.join(", "));
        inner.push_str(" FROM ");
        inner.push_str(&table_sql);
        inner.push(' ');
        inner.push_str(&quoted_main_as);
        for join in join_list {
            inner.push_str(join);
        }

        // WHERE goes to the inner query in subquery mode; synthesized
        // existence checks always land in the outer WHERE.
        if let Some(filter) = &options.filter {
            let rendered = self.where_clause(filter, Some(&main_as));
            if !rendered.is_empty() {
                inner.push_str(" WHERE ");
                inner.push_str(&rendered);
            }
        }

        if !options.group.is_empty() {
            let group = options
                .group
                .iter()
                .map(|g| self.quote_path(g))
                .collect::<Vec<_>>()
                .join(", ");
            inner.push_str(" GROUP BY ");
            inner.push_str(&group);
        }

        if let Some(having) = &options.having {
            inner.push_str(" HAVING ");
            inner.push_str(&self.where_clause(having, None));
        }

        // ORDER BY: the outer query orders on everything; in subquery mode
        // column-only items are also pushed into the inner query so the
        // ROWNUM filter sees deterministic row numbers.
        let mut main_order = Vec::new();
        let mut sub_order = Vec::new();
        for item in &options.order {
            item.validate()?;
            let rendered = self.render_order_item(item);
            if sub_query && item.table.is_none() && !item.literal {
                sub_order.push(rendered.clone());
            }
            main_order.push(rendered);
        }
        if sub_query && !sub_order.is_empty() {
            inner.push_str(" ORDER BY ");
            inner.push_str(&sub_order.join(", "));
        }

        // Final assembly.
        let mut query = if sub_query {
            let mut outer = format!(
                "SELECT {} FROM ({}) {}",
                main_attrs.join(", "),
                inner,
                quoted_main_as
            );
            for join in &joins.main_joins {
                outer.push_str(join);
            }
            if !joins.outer_where.is_empty() {
                outer.push_str(" WHERE ");
                outer.push_str(&joins.outer_where.join(" AND "));
            }
            outer
        } else {
            inner
        };

        if !main_order.is_empty() {
            query.push_str(" ORDER BY ");
            query.push_str(&main_order.join(", "));
        }

        // Pagination last; locking last of all, and only when supported.
        query = self.add_limit_and_offset(options.limit, options.offset, &query);
        if options.lock && self.supports().lock {
            query.push_str(" FOR UPDATE");
        }

        Ok(GeneratedQuery {
            sql: query,
            binds: Default::default(),
            kind: StatementKind::Select,
        })
    }

    /// Wrap a finished query in the row-numbering pagination form.
    ///
    /// Idempotent: a query already wrapped is returned unchanged, so nested
    /// generation paths cannot double-wrap.
    pub fn add_limit_and_offset(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        sql: &str,
    ) -> String {
        if sql.trim_start().starts_with(PAGINATION_PREFIX) {
            return sql.to_string();
        }
        let wrap = |predicate: String| {
            format!("{PAGINATION_PREFIX} FROM ({sql}) t) t2 WHERE t2.{predicate}")
        };
        match (limit, offset) {
            (Some(limit), None) => wrap(format!("ROWNUM_1 <= {limit}")),
            (None, Some(offset)) => wrap(format!("ROWNUM_1 > {offset}")),
            (Some(limit), Some(offset)) => wrap(format!(
                "ROWNUM_1 BETWEEN {} AND {}",
                offset + 1,
                offset + limit
            )),
            (None, None) => sql.to_string(),
        }
    }

    fn check_alias_uniqueness(&self, includes: &[JoinNode]) -> Result<()> {
        fn walk<'a>(nodes: &'a [JoinNode], seen: &mut HashSet<&'a str>) -> Result<()> {
            for node in nodes {
                if !seen.insert(node.as_name.as_str()) {
                    return Err(DialectError::query(format!(
                        "include alias {} is not unique within its join tree",
                        node.as_name
                    )));
                }
                walk(&node.include, seen)?;
            }
            Ok(())
        }
        let mut seen = HashSet::new();
        walk(includes, &mut seen)
    }

    /// Emit the join clause(s) for one include node and recurse into its
    /// children, routing output between the inner and outer query.
    #[allow(clippy::too_many_arguments)]
    fn generate_join_queries(
        &self,
        node: &JoinNode,
        parent_alias: &str,
        main_as: &str,
        _parent_model: &Model,
        options: &SelectOptions,
        sub_query: bool,
        parent_in_sub: bool,
    ) -> Result<JoinQueries> {
        let mut out = JoinQueries::default();

        // Nested includes carry their parent's alias as a prefix.
        let alias = if parent_alias == main_as {
            node.as_name.clone()
        } else {
            format!("{parent_alias}.{}", node.as_name)
        };
        let join_type = if node.required {
            " INNER JOIN "
        } else {
            " LEFT OUTER JOIN "
        };

        // Projected attributes, prefixed by the node alias and re-aliased
        // under the dotted path.
        if options.include_attributes {
            let rendered: Vec<String> = node
                .attributes
                .iter()
                .map(|a| self.render_include_projection(a, &alias))
                .collect();
            if node.sub_query && sub_query {
                out.sub_attrs.extend(rendered);
            } else {
                out.main_attrs.extend(rendered);
            }
        }

        let mut join_item = String::new();

        if let Some(through) = &node.through {
            // Many-to-many: double join through the association table.
            let through_as = format!("{alias}.{}", through.as_name);

            if options.include_attributes {
                // Through attributes always project into the outer query;
                // a multi join never executes inside the subquery.
                for attr in &through.attributes {
                    out.main_attrs
                        .push(self.render_include_projection(attr, &through_as));
                }
            }

            let source_side = if sub_query && !node.sub_query && parent_in_sub {
                // The parent lives in the wrapped inner query; only its
                // aliased output column is visible out here.
                self.quote_identifier(&format!(
                    "{parent_alias}.{}",
                    node.association.source_attribute
                ))
            } else {
                format!(
                    "{}.{}",
                    self.quote_identifier(parent_alias),
                    self.quote_identifier(&node.association.source_attribute)
                )
            };
            let source_join_on = format!(
                "{source_side} = {}.{}",
                self.quote_identifier(&through_as),
                self.quote_identifier(&through.source_identifier)
            );
            let target_join_on = format!(
                "{}.{} = {}.{}",
                self.quote_identifier(&alias),
                self.quote_identifier(&node.association.target_attribute),
                self.quote_identifier(&through_as),
                self.quote_identifier(&through.target_identifier)
            );
            let through_where = through
                .filter
                .as_ref()
                .map(|f| self.where_clause(f, Some(&through_as)));

            if self.supports().join_table_dependent {
                // One parenthesized dependent join: the association-table
                // join and the target join succeed or fail atomically.
                join_item.push_str(join_type);
                join_item.push('(');
                join_item.push_str(&self.quote_table(&through.model.table, Some(&through_as)));
                join_item.push_str(" INNER JOIN ");
                join_item.push_str(&self.quote_table(&node.model.table, Some(&alias)));
                join_item.push_str(" ON ");
                join_item.push_str(&target_join_on);
                if let Some(w) = &through_where {
                    join_item.push_str(" AND ");
                    join_item.push_str(w);
                }
                join_item.push_str(") ON ");
                join_item.push_str(&source_join_on);
            } else {
                join_item.push_str(join_type);
                join_item.push_str(&self.quote_table(&through.model.table, Some(&through_as)));
                join_item.push_str(" ON ");
                join_item.push_str(&source_join_on);
                join_item.push_str(join_type);
                join_item.push_str(&self.quote_table(&node.model.table, Some(&alias)));
                join_item.push_str(" ON ");
                join_item.push_str(&target_join_on);
                if let Some(w) = &through_where {
                    join_item.push_str(" AND ");
                    join_item.push_str(w);
                }
            }

            if let Some(filter) = &node.filter {
                join_item.push_str(" AND ");
                join_item.push_str(&self.where_clause(filter, Some(&alias)));
            }

            if sub_query && node.required {
                out.outer_where.push(self.through_existence_check(
                    node,
                    through,
                    &through_as,
                    parent_alias,
                ));
            }
        } else {
            // Direct association.
            let left_side = if sub_query && !node.sub_query && parent_in_sub {
                self.quote_identifier(&format!(
                    "{parent_alias}.{}",
                    node.association.source_attribute
                ))
            } else {
                format!(
                    "{}.{}",
                    self.quote_identifier(parent_alias),
                    self.quote_identifier(&node.association.source_attribute)
                )
            };
            let right_side = format!(
                "{}.{}",
                self.quote_identifier(&alias),
                self.quote_identifier(&node.association.target_attribute)
            );
            let mut join_on = format!("{left_side} = {right_side}");

            // The unaliased form stays valid inside a correlated subquery.
            let mut correlated_join_on = format!(
                "{}.{} = {right_side}",
                self.quote_identifier(parent_alias),
                self.quote_identifier(&node.association.source_attribute)
            );

            if let Some(filter) = &node.filter {
                let rendered = self.where_clause(filter, Some(&alias));
                join_on.push_str(" AND ");
                join_on.push_str(&rendered);
                correlated_join_on.push_str(" AND ");
                correlated_join_on.push_str(&rendered);
            }

            // A required multi association cannot be joined into the
            // wrapped inner query, so filter the outer query through a
            // correlated existence check instead.
            if sub_query && node.association.kind.is_multi() && node.required {
                out.outer_where
                    .push(self.existence_check(node, &alias, &correlated_join_on));
            }

            join_item.push_str(join_type);
            join_item.push_str(&self.quote_table(&node.model.table, Some(&alias)));
            join_item.push_str(" ON ");
            join_item.push_str(&join_on);
        }

        if node.sub_query && sub_query {
            out.sub_joins.push(join_item);
        } else {
            out.main_joins.push(join_item);
        }

        for child in &node.include {
            let built = self.generate_join_queries(
                child,
                &alias,
                main_as,
                &node.model,
                options,
                sub_query,
                node.sub_query,
            )?;
            out.merge(built);
        }

        Ok(out)
    }

    /// Correlated single-column select proving a direct association row
    /// exists, injected as `( ... ) IS NOT NULL`.
    fn existence_check(&self, node: &JoinNode, alias: &str, join_on: &str) -> String {
        format!(
            "( SELECT {}.{} FROM {} WHERE ({join_on}) AND ROWNUM <= 1 ) IS NOT NULL",
            self.quote_identifier(alias),
            self.quote_identifier(&node.association.target_attribute),
            self.quote_table(&node.model.table, Some(alias)),
        )
    }

    /// Existence check through the association table of a many-to-many
    /// include: the join table is joined to the target and correlated to
    /// the outer parent.
    fn through_existence_check(
        &self,
        node: &JoinNode,
        through: &crate::descriptor::Through,
        through_as: &str,
        parent_alias: &str,
    ) -> String {
        let target_join_on = format!(
            "{}.{} = {}.{}",
            self.quote_identifier(&node.as_name),
            self.quote_identifier(&node.association.target_attribute),
            self.quote_identifier(through_as),
            self.quote_identifier(&through.target_identifier)
        );
        let correlation = format!(
            "{}.{} = {}.{}",
            self.quote_identifier(parent_alias),
            self.quote_identifier(&node.association.source_attribute),
            self.quote_identifier(through_as),
            self.quote_identifier(&through.source_identifier)
        );
        format!(
            "( SELECT {}.{} FROM {} INNER JOIN {} ON {target_join_on} \
             WHERE ({correlation}) AND ROWNUM <= 1 ) IS NOT NULL",
            self.quote_identifier(through_as),
            self.quote_identifier(&through.source_identifier),
            self.quote_table(&through.model.table, Some(through_as)),
            self.quote_table(&node.model.table, Some(&node.as_name)),
        )
    }

    fn render_projection(&self, projection: &Projection, prefix: Option<&str>) -> String {
        match projection {
            Projection::Column(c) => match prefix {
                Some(p) => format!("{}.{}", self.quote_identifier(p), self.quote_identifier(c)),
                None => self.quote_identifier(c),
            },
            Projection::Aliased { column, alias } => {
                let col = match prefix {
                    Some(p) => format!(
                        "{}.{}",
                        self.quote_identifier(p),
                        self.quote_identifier(column)
                    ),
                    None => self.quote_identifier(column),
                };
                format!("{col} {}", self.quote_identifier(alias))
            }
            Projection::Literal(text) => text.clone(),
        }
    }

    /// Include attributes project as `"alias"."col" "alias.col"`: the
    /// dotted output name is what the row mapper splits on.
    fn render_include_projection(&self, projection: &Projection, alias: &str) -> String {
        match projection {
            Projection::Column(c) => format!(
                "{}.{} {}",
                self.quote_identifier(alias),
                self.quote_identifier(c),
                self.quote_identifier(&format!("{alias}.{c}"))
            ),
            Projection::Aliased { column, alias: out } => format!(
                "{}.{} {}",
                self.quote_identifier(alias),
                self.quote_identifier(column),
                self.quote_identifier(&format!("{alias}.{out}"))
            ),
            Projection::Literal(text) => text.clone(),
        }
    }

    fn render_order_item(&self, item: &OrderItem) -> String {
        if item.literal {
            return item.expr.clone();
        }
        let mut out = match &item.table {
            Some(table) => format!(
                "{}.{}",
                self.quote_identifier(table),
                self.quote_identifier(&item.expr)
            ),
            None => self.quote_identifier(&item.expr),
        };
        if let Some(dir) = &item.direction {
            out.push(' ');
            out.push_str(&dir.to_uppercase());
        }
        out
    }
}

const PAGINATION_PREFIX: &str = "SELECT * FROM (SELECT t.*, ROWNUM ROWNUM_1";
