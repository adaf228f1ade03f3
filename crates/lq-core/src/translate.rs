//! SQL generation from operation logs
//!
//! The translator walks a relation's log once, folding steps into a single
//! `SELECT` for as long as SQL clause order allows and nesting the statement
//! built so far as a subquery when a step cannot be merged (a filter over an
//! aggregate, a sort over a limit, anything after a raw fragment or a join).
//! Subquery aliases are numbered in emission order so the output is fully
//! determined by the relation graph and the dialect.

use crate::error::{LazyError, LazyResult};
use crate::expr::Expr;
use crate::oplog::OperationLog;
use crate::relation::{Origin, Relation, RelationId};
use crate::step::{
    join_columns, Aggregation, JoinKind, JoinSource, JoinSpec, SortDirection, SortKey, Step,
};
use lq_db::Value;
use lq_sql::{AggregateFunction, SqlDialect};
use std::sync::Arc;

const COPY_TABLE_PREFIX: &str = "lq_copy_";

/// Temporary table holding a copied foreign join side
pub(crate) fn copy_table_name(id: RelationId) -> String {
    format!("{}{}", COPY_TABLE_PREFIX, id.as_u64())
}

/// Translate `relation` into a query for `dialect`.
///
/// Pure: the engine is never contacted. Fails with `CrossSession` when a join
/// pulls in another session's relation without the copy flag, and with
/// `Translation` when a step has no rendering in `dialect`.
pub fn translate(relation: &Relation, dialect: &dyn SqlDialect) -> LazyResult<String> {
    let mut translator = Translator {
        dialect,
        root: relation,
        aliases: 0,
    };
    let select = translator.build(relation)?;
    let sql = select.render(dialect);
    log::debug!("Translated {} for {}:\n{}", relation.id(), dialect.name(), sql);
    Ok(sql)
}

/// One `SELECT` under construction
struct Select {
    /// Rendered FROM clause body
    from: String,
    /// FROM is a single bare table
    from_table: bool,
    /// Rendered select items; empty means `*`
    projection: Vec<String>,
    filters: Vec<String>,
    group_by: Vec<String>,
    order_by: Vec<SortKey>,
    limit: Option<u64>,
    /// Raw fragment appended after every other clause
    tail: Option<String>,
    aggregated: bool,
    /// Projection holds expressions or renames
    computed: bool,
    /// FROM is a join; bare column names may be ambiguous
    joined: bool,
    /// Output columns, when known
    columns: Option<Arc<[String]>>,
}

impl Select {
    fn new(from: String, from_table: bool, columns: Option<Arc<[String]>>) -> Self {
        Self {
            from,
            from_table,
            projection: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            tail: None,
            aggregated: false,
            computed: false,
            joined: false,
            columns,
        }
    }

    /// Plain `SELECT * FROM source`
    fn is_trivial(&self) -> bool {
        self.projection.is_empty()
            && self.filters.is_empty()
            && self.group_by.is_empty()
            && self.order_by.is_empty()
            && self.limit.is_none()
            && self.tail.is_none()
            && !self.joined
    }

    /// Whether a column-level step must read this select's output from a
    /// subquery instead of merging into it
    fn is_closed(&self) -> bool {
        self.aggregated || self.computed || self.joined || self.tail.is_some()
    }

    fn render(&self, dialect: &dyn SqlDialect) -> String {
        let mut sql = String::from("SELECT ");
        if self.projection.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.projection.join(", "));
        }
        sql.push_str("\nFROM ");
        sql.push_str(&self.from);

        match self.filters.as_slice() {
            [] => {}
            [only] => {
                sql.push_str("\nWHERE ");
                sql.push_str(only);
            }
            many => {
                let parts: Vec<String> = many.iter().map(|f| format!("({})", f)).collect();
                sql.push_str("\nWHERE ");
                sql.push_str(&parts.join(" AND "));
            }
        }
        if !self.group_by.is_empty() {
            sql.push_str("\nGROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|k| render_sort_key(dialect, k))
                .collect();
            sql.push_str("\nORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        if let Some(n) = self.limit {
            sql.push('\n');
            sql.push_str(&dialect.render_limit(n));
        }
        if let Some(tail) = &self.tail {
            sql.push('\n');
            sql.push_str(tail.trim());
        }
        sql
    }
}

struct Translator<'a> {
    dialect: &'a dyn SqlDialect,
    /// Relation being translated; its session owns every non-copied join side
    root: &'a Relation,
    aliases: usize,
}

impl<'a> Translator<'a> {
    fn alias(&mut self) -> String {
        self.aliases += 1;
        format!("q{:02}", self.aliases)
    }

    fn quote(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    fn build(&mut self, relation: &Relation) -> LazyResult<Select> {
        let log = OperationLog::of(relation);
        let base = log.base();
        let mut select = match base.origin() {
            Origin::Table(name) => {
                Select::new(quote_qualified(self.dialect, name), true, base.shared_columns())
            }
            Origin::Query(sql) => {
                let alias = self.alias();
                Select::new(subquery(sql, &alias), false, base.shared_columns())
            }
            Origin::Derived { .. } => {
                return Err(self.translation_error(
                    base.id(),
                    "base",
                    "operation log does not start at a table or query".to_string(),
                ))
            }
        };

        for node in log.nodes() {
            let Some(step) = node.step() else {
                continue;
            };
            select = self.apply(select, node, step)?;
            select.columns = node.shared_columns();
        }
        Ok(select)
    }

    fn apply(&mut self, mut select: Select, node: &Relation, step: &Step) -> LazyResult<Select> {
        match step {
            Step::Filter(predicate) => {
                if select.is_closed() || select.limit.is_some() {
                    select = self.wrap(select, true);
                }
                let rendered = self.expr(predicate);
                select.filters.push(rendered);
            }
            Step::Project(columns) => {
                if select.is_closed() {
                    select = self.wrap(select, true);
                }
                select.projection = columns.iter().map(|c| self.quote(c)).collect();
            }
            Step::Mutate(items) => {
                let touches_order = items.iter().any(|(name, _)| {
                    select
                        .order_by
                        .iter()
                        .any(|k| k.column.eq_ignore_ascii_case(name))
                });
                if touches_order {
                    select = self.wrap(select, false);
                } else if select.is_closed() {
                    select = self.wrap(select, true);
                }
                select.projection = self.mutate_projection(select.columns.as_deref(), items);
                select.computed = true;
            }
            Step::Aggregate {
                group_keys,
                aggregations,
            } => {
                if group_keys.is_empty() && aggregations.is_empty() {
                    return Err(self.translation_error(
                        node.id(),
                        "aggregate",
                        "no group keys and no aggregations".to_string(),
                    ));
                }
                if select.is_closed() || select.limit.is_some() {
                    select = self.wrap(select, true);
                }
                let keys: Vec<String> = group_keys.iter().map(|k| self.quote(k)).collect();
                let mut items = keys.clone();
                for agg in aggregations {
                    let call = self.aggregate(node, agg)?;
                    items.push(format!("{} AS {}", call, self.quote(&agg.output)));
                }
                select.order_by.clear();
                select.projection = items;
                select.group_by = keys;
                select.aggregated = true;
                select.computed = true;
            }
            Step::Sort(keys) => {
                if select.joined || select.limit.is_some() || select.tail.is_some() {
                    select = self.wrap(select, false);
                }
                select.order_by = keys.clone();
            }
            Step::Limit(n) => {
                if select.tail.is_some() {
                    select = self.wrap(select, true);
                }
                select.limit = Some(select.limit.map_or(*n, |current| current.min(*n)));
            }
            Step::RawQueryFragment(fragment) => {
                if !select.is_trivial() {
                    select = self.wrap(select, false);
                }
                select.tail = Some(fragment.clone());
            }
            Step::Join { other, spec } => {
                select = self.join(select, node, other, spec)?;
            }
        }
        Ok(select)
    }

    /// Nest `inner` as a subquery of a fresh `SELECT *`.
    ///
    /// With `lift_order`, an ORDER BY over columns the subquery still exposes
    /// moves to the outer select; the inner keeps it only when a LIMIT
    /// depends on it.
    fn wrap(&mut self, mut inner: Select, lift_order: bool) -> Select {
        let columns = inner.columns.clone();
        let lift = lift_order
            && !inner.order_by.is_empty()
            && inner.tail.is_none()
            && sort_keys_visible(&inner.order_by, columns.as_deref());
        let order = if lift {
            inner.order_by.clone()
        } else {
            Vec::new()
        };
        if lift && inner.limit.is_none() {
            inner.order_by.clear();
        }

        let alias = self.alias();
        let mut outer = Select::new(subquery(&inner.render(self.dialect), &alias), false, columns);
        outer.order_by = order;
        outer
    }

    /// Render a select as a join input, returning the source text and alias
    fn source(&mut self, select: Select) -> (String, String) {
        let alias = self.alias();
        if select.is_trivial() && select.from_table {
            return (format!("{} AS {}", select.from, alias), alias);
        }
        let sql = select.render(self.dialect);
        (subquery(&sql, &alias), alias)
    }

    fn join(
        &mut self,
        left: Select,
        node: &Relation,
        other: &Relation,
        spec: &JoinSpec,
    ) -> LazyResult<Select> {
        let left_columns = left.columns.clone();
        let right_columns = other.shared_columns();

        if !other.same_session(self.root) && !spec.copy {
            return Err(LazyError::CrossSession {
                relation: node.id(),
                other: other.id(),
                session: self.root.session_id(),
                other_session: other.session_id(),
            });
        }
        if spec.kind == JoinKind::Full
            && !spec.effective_keys().is_empty()
            && (left_columns.is_none() || right_columns.is_none())
        {
            return Err(self.translation_error(
                node.id(),
                "full join",
                "key columns cannot be coalesced while the columns of one side are unknown"
                    .to_string(),
            ));
        }

        let (left_src, l) = self.source(left);
        let (right_src, r) = if other.same_session(self.root) {
            let right = self.build(other)?;
            self.source(right)
        } else {
            let alias = self.alias();
            let table = self.quote(&copy_table_name(other.id()));
            (format!("{} AS {}", table, alias), alias)
        };

        let conditions: Vec<String> = spec
            .effective_keys()
            .iter()
            .map(|(lk, rk)| {
                let lk = spelled_as(left_columns.as_deref(), lk);
                let rk = spelled_as(right_columns.as_deref(), rk);
                format!("{}.{} = {}.{}", l, self.quote(lk), r, self.quote(rk))
            })
            .collect();

        let mut select = Select::new(String::new(), false, None);
        select.joined = true;

        match spec.kind {
            JoinKind::Semi | JoinKind::Anti => {
                let mut probe = format!("SELECT 1\nFROM {}", right_src);
                if !conditions.is_empty() {
                    probe.push_str("\nWHERE ");
                    probe.push_str(&conditions.join(" AND "));
                }
                let negate = if spec.kind == JoinKind::Anti { "NOT " } else { "" };
                select.from = left_src;
                select.projection = match left_columns.as_deref() {
                    Some(cols) => cols
                        .iter()
                        .map(|c| format!("{}.{}", l, self.quote(c)))
                        .collect(),
                    None => vec![format!("{}.*", l)],
                };
                select
                    .filters
                    .push(format!("{}EXISTS (\n{}\n)", negate, indent(&probe)));
            }
            kind => {
                let on = if kind == JoinKind::Cross {
                    String::new()
                } else if conditions.is_empty() {
                    " ON TRUE".to_string()
                } else {
                    format!(" ON {}", conditions.join(" AND "))
                };
                select.from = format!("{}\n{} {}{}", left_src, join_keyword(kind), right_src, on);
                if let (Some(lc), Some(rc)) = (left_columns.as_deref(), right_columns.as_deref()) {
                    select.projection = join_columns(lc, rc, spec)
                        .into_iter()
                        .map(|c| {
                            let (expr, natural) = match &c.source {
                                JoinSource::Left(col) => {
                                    (format!("{}.{}", l, self.quote(col)), col.as_str())
                                }
                                JoinSource::Right(col) => {
                                    (format!("{}.{}", r, self.quote(col)), col.as_str())
                                }
                                JoinSource::Coalesce(lk, rk) => (
                                    format!(
                                        "COALESCE({}.{}, {}.{})",
                                        l,
                                        self.quote(lk),
                                        r,
                                        self.quote(rk)
                                    ),
                                    "",
                                ),
                            };
                            if natural == c.name {
                                expr
                            } else {
                                format!("{} AS {}", expr, self.quote(&c.name))
                            }
                        })
                        .collect();
                }
            }
        }
        Ok(select)
    }

    fn mutate_projection(&self, input: Option<&[String]>, items: &[(String, Expr)]) -> Vec<String> {
        let computed =
            |name: &str, expr: &Expr| format!("{} AS {}", self.expr(expr), self.quote(name));
        let mut out = Vec::with_capacity(input.map_or(1, <[String]>::len) + items.len());
        match input {
            Some(columns) => {
                for column in columns {
                    match items.iter().find(|(name, _)| name.eq_ignore_ascii_case(column)) {
                        Some((name, expr)) => out.push(computed(name, expr)),
                        None => out.push(self.quote(column)),
                    }
                }
                for (name, expr) in items {
                    if !columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                        out.push(computed(name, expr));
                    }
                }
            }
            None => {
                out.push("*".to_string());
                out.extend(items.iter().map(|(name, expr)| computed(name, expr)));
            }
        }
        out
    }

    fn aggregate(&self, node: &Relation, agg: &Aggregation) -> LazyResult<String> {
        let Some(name) = self.dialect.aggregate_function(agg.function) else {
            return Err(self.translation_error(
                node.id(),
                &format!("aggregate {}", agg.function),
                format!("{} has no {} function", self.dialect.name(), agg.function),
            ));
        };
        if !agg.function.takes_argument() {
            return Ok(format!("{}(*)", name));
        }
        match (agg.function, &agg.argument) {
            (_, None) => Err(self.translation_error(
                node.id(),
                &format!("aggregate {}", agg.function),
                format!("{} needs an argument", agg.function),
            )),
            (AggregateFunction::CountDistinct, Some(arg)) => {
                Ok(format!("{}(DISTINCT {})", name, self.expr(arg)))
            }
            (_, Some(arg)) => Ok(format!("{}({})", name, self.expr(arg))),
        }
    }

    fn expr(&self, expr: &Expr) -> String {
        render_expr(self.dialect, expr, false)
    }

    fn translation_error(&self, relation: RelationId, operation: &str, reason: String) -> LazyError {
        LazyError::Translation {
            relation,
            operation: operation.to_string(),
            dialect: self.dialect.name(),
            reason,
        }
    }
}

/// Render an expression; `nested` operands get parentheses
fn render_expr(dialect: &dyn SqlDialect, expr: &Expr, nested: bool) -> String {
    let group = |s: String| if nested { format!("({})", s) } else { s };
    match expr {
        Expr::Column(name) => dialect.quote_ident(name),
        Expr::Literal(value) => render_literal(dialect, value),
        Expr::Binary { left, op, right } => group(format!(
            "{} {} {}",
            render_expr(dialect, left, true),
            op.sql(),
            render_expr(dialect, right, true)
        )),
        Expr::Not(inner) => group(format!("NOT {}", render_expr(dialect, inner, true))),
        Expr::IsNull { expr, negated } => group(format!(
            "{} IS {}NULL",
            render_expr(dialect, expr, true),
            if *negated { "NOT " } else { "" }
        )),
        // `x IN ()` is not valid SQL
        Expr::InList { list, negated, .. } if list.is_empty() => {
            let constant = if *negated { "TRUE" } else { "FALSE" };
            constant.to_string()
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let items: Vec<String> = list
                .iter()
                .map(|item| render_expr(dialect, item, false))
                .collect();
            group(format!(
                "{} {}IN ({})",
                render_expr(dialect, expr, true),
                if *negated { "NOT " } else { "" },
                items.join(", ")
            ))
        }
        Expr::Function { name, args } => {
            let args: Vec<String> = args
                .iter()
                .map(|arg| render_expr(dialect, arg, false))
                .collect();
            format!("{}({})", name, args.join(", "))
        }
        Expr::Raw(sql) => group(sql.clone()),
    }
}

fn render_literal(dialect: &dyn SqlDialect, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(true) => "TRUE".to_string(),
        Value::Boolean(false) => "FALSE".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) if f.is_finite() => format!("{:?}", f),
        Value::Float(f) => {
            let text = if f.is_nan() {
                "NaN"
            } else if f.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            format!("CAST({} AS DOUBLE)", dialect.quote_string(text))
        }
        Value::Text(s) => dialect.quote_string(s),
    }
}

fn render_sort_key(dialect: &dyn SqlDialect, key: &SortKey) -> String {
    match key.direction {
        SortDirection::Asc => dialect.quote_ident(&key.column),
        SortDirection::Desc => format!("{} DESC", dialect.quote_ident(&key.column)),
    }
}

fn join_keyword(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
        JoinKind::Right => "RIGHT JOIN",
        JoinKind::Full => "FULL OUTER JOIN",
        JoinKind::Cross => "CROSS JOIN",
        JoinKind::Semi => "SEMI JOIN",
        JoinKind::Anti => "ANTI JOIN",
    }
}

/// Quote a possibly schema-qualified table name part by part
fn quote_qualified(dialect: &dyn SqlDialect, name: &str) -> String {
    name.split('.')
        .map(|part| dialect.quote_ident(part))
        .collect::<Vec<_>>()
        .join(".")
}

fn sort_keys_visible(keys: &[SortKey], columns: Option<&[String]>) -> bool {
    match columns {
        None => true,
        Some(cols) => keys
            .iter()
            .all(|k| cols.iter().any(|c| c.eq_ignore_ascii_case(&k.column))),
    }
}

/// `name` as spelled in `columns`, falling back to `name` itself
fn spelled_as<'a>(columns: Option<&'a [String]>, name: &'a str) -> &'a str {
    columns
        .and_then(|cols| cols.iter().find(|c| c.eq_ignore_ascii_case(name)))
        .map_or(name, String::as_str)
}

fn subquery(sql: &str, alias: &str) -> String {
    format!("(\n{}\n) AS {}", indent(sql.trim()), alias)
}

fn indent(sql: &str) -> String {
    sql.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("  {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "translate_test.rs"]
mod tests;
