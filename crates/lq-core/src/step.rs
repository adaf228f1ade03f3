//! Transformation steps, one per derived relation

use crate::expr::Expr;
use crate::relation::Relation;
use lq_sql::AggregateFunction;
use std::fmt;

/// A single transformation from a parent relation to a child.
///
/// Steps only carry what is needed to regenerate SQL; none of them execute.
#[derive(Debug, Clone)]
pub enum Step {
    /// Keep only the named columns, in the given order
    Project(Vec<String>),
    /// Keep rows matching the predicate
    Filter(Expr),
    /// Group by keys and compute aggregates
    Aggregate {
        group_keys: Vec<String>,
        aggregations: Vec<Aggregation>,
    },
    /// Order rows
    Sort(Vec<SortKey>),
    /// Join with another relation
    Join { other: Relation, spec: JoinSpec },
    /// SQL clause text appended verbatim
    RawQueryFragment(String),
    /// Add or replace computed columns
    Mutate(Vec<(String, Expr)>),
    /// Keep at most n rows
    Limit(u64),
}

impl Step {
    /// Short operation name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Step::Project(_) => "project",
            Step::Filter(_) => "filter",
            Step::Aggregate { .. } => "aggregate",
            Step::Sort(_) => "sort",
            Step::Join { .. } => "join",
            Step::RawQueryFragment(_) => "raw",
            Step::Mutate(_) => "mutate",
            Step::Limit(_) => "limit",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Project(cols) => write!(f, "project({})", cols.join(", ")),
            Step::Filter(pred) => write!(f, "filter({})", pred),
            Step::Aggregate {
                group_keys,
                aggregations,
            } => {
                let aggs: Vec<String> = aggregations.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "aggregate(by: [{}], {})",
                    group_keys.join(", "),
                    aggs.join(", ")
                )
            }
            Step::Sort(keys) => {
                let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
                write!(f, "sort({})", keys.join(", "))
            }
            Step::Join { other, spec } => {
                let keys: Vec<String> = spec
                    .keys
                    .iter()
                    .map(|(l, r)| if l == r { l.clone() } else { format!("{}={}", l, r) })
                    .collect();
                write!(
                    f,
                    "join({}, {}, on: [{}]{})",
                    spec.kind,
                    other.id(),
                    keys.join(", "),
                    if spec.copy { ", copy" } else { "" }
                )
            }
            Step::RawQueryFragment(text) => write!(f, "raw({:?})", text),
            Step::Mutate(items) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|(name, expr)| format!("{} = {}", name, expr))
                    .collect();
                write!(f, "mutate({})", items.join(", "))
            }
            Step::Limit(n) => write!(f, "limit({})", n),
        }
    }
}

/// One aggregate output column
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Output column name
    pub output: String,
    /// Aggregate function
    pub function: AggregateFunction,
    /// Argument; `None` only for `COUNT(*)`
    pub argument: Option<Expr>,
}

impl Aggregation {
    fn with_arg(output: impl Into<String>, function: AggregateFunction, arg: Expr) -> Self {
        Self {
            output: output.into(),
            function,
            argument: Some(arg),
        }
    }

    pub fn count_star(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            function: AggregateFunction::CountStar,
            argument: None,
        }
    }

    pub fn count(output: impl Into<String>, arg: Expr) -> Self {
        Self::with_arg(output, AggregateFunction::Count, arg)
    }

    pub fn count_distinct(output: impl Into<String>, arg: Expr) -> Self {
        Self::with_arg(output, AggregateFunction::CountDistinct, arg)
    }

    pub fn sum(output: impl Into<String>, arg: Expr) -> Self {
        Self::with_arg(output, AggregateFunction::Sum, arg)
    }

    pub fn avg(output: impl Into<String>, arg: Expr) -> Self {
        Self::with_arg(output, AggregateFunction::Avg, arg)
    }

    pub fn min(output: impl Into<String>, arg: Expr) -> Self {
        Self::with_arg(output, AggregateFunction::Min, arg)
    }

    pub fn max(output: impl Into<String>, arg: Expr) -> Self {
        Self::with_arg(output, AggregateFunction::Max, arg)
    }

    pub fn median(output: impl Into<String>, arg: Expr) -> Self {
        Self::with_arg(output, AggregateFunction::Median, arg)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(arg) if self.function.takes_argument() => {
                write!(f, "{} = {}({})", self.output, self.function, arg)
            }
            _ => write!(f, "{} = {}", self.output, self.function),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{}", self.column),
            SortDirection::Desc => write!(f, "desc({})", self.column),
        }
    }
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    /// Left rows with at least one match; left columns only
    Semi,
    /// Left rows with no match; left columns only
    Anti,
    /// Cartesian product; keys are ignored
    Cross,
}

impl JoinKind {
    /// Whether the join outputs columns of the right side
    pub fn keeps_right_columns(self) -> bool {
        !matches!(self, JoinKind::Semi | JoinKind::Anti)
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
            JoinKind::Semi => "semi",
            JoinKind::Anti => "anti",
            JoinKind::Cross => "cross",
        };
        write!(f, "{}", name)
    }
}

/// How two relations are joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Join type
    pub kind: JoinKind,
    /// Equality keys as (left column, right column)
    pub keys: Vec<(String, String)>,
    /// Pull a right side living in another session into this one
    pub copy: bool,
}

impl JoinSpec {
    /// Join of `kind` on same-named key columns
    pub fn new<S: Into<String>>(kind: JoinKind, on: impl IntoIterator<Item = S>) -> Self {
        Self {
            kind,
            keys: on
                .into_iter()
                .map(|k| {
                    let k = k.into();
                    (k.clone(), k)
                })
                .collect(),
            copy: false,
        }
    }

    pub fn inner<S: Into<String>>(on: impl IntoIterator<Item = S>) -> Self {
        Self::new(JoinKind::Inner, on)
    }

    pub fn left<S: Into<String>>(on: impl IntoIterator<Item = S>) -> Self {
        Self::new(JoinKind::Left, on)
    }

    pub fn right<S: Into<String>>(on: impl IntoIterator<Item = S>) -> Self {
        Self::new(JoinKind::Right, on)
    }

    pub fn full<S: Into<String>>(on: impl IntoIterator<Item = S>) -> Self {
        Self::new(JoinKind::Full, on)
    }

    pub fn semi<S: Into<String>>(on: impl IntoIterator<Item = S>) -> Self {
        Self::new(JoinKind::Semi, on)
    }

    pub fn anti<S: Into<String>>(on: impl IntoIterator<Item = S>) -> Self {
        Self::new(JoinKind::Anti, on)
    }

    pub fn cross() -> Self {
        Self::new(JoinKind::Cross, Vec::<String>::new())
    }

    /// Add a key pair whose column names differ between the sides
    pub fn on(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.keys.push((left.into(), right.into()));
        self
    }

    /// Allow the right side to come from another session.
    ///
    /// It is materialized in full and copied into a temporary table of the
    /// left side's session before the join runs, so this only suits small
    /// right sides.
    pub fn copy(mut self, copy: bool) -> Self {
        self.copy = copy;
        self
    }

    /// Key pairs that take part in the join condition
    pub fn effective_keys(&self) -> &[(String, String)] {
        if self.kind == JoinKind::Cross {
            &[]
        } else {
            &self.keys
        }
    }
}

/// Where a join output column comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinSource {
    /// Column of the left input
    Left(String),
    /// Column of the right input
    Right(String),
    /// `COALESCE(left, right)` of a full-join key pair
    Coalesce(String, String),
}

/// One output column of a join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    pub name: String,
    pub source: JoinSource,
}

/// Output columns of a join when both inputs' columns are known.
///
/// Left columns come first, then right non-key columns. Key columns keep the
/// left name; right joins read them from the right side and full joins
/// coalesce both. Other names present on both sides get `_x` / `_y` suffixes.
/// Names compare case-insensitively.
pub fn join_columns(left: &[String], right: &[String], spec: &JoinSpec) -> Vec<JoinColumn> {
    let keys = spec.effective_keys();
    let same = |a: &str, b: &str| a.eq_ignore_ascii_case(b);
    let key_for_left = |name: &str| keys.iter().find(|(l, _)| same(l, name));
    let is_right_key = |name: &str| keys.iter().any(|(_, r)| same(r, name));
    // key as spelled in the right relation
    let right_name = |key: &str| {
        right
            .iter()
            .find(|c| same(c, key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    };

    let mut out = Vec::with_capacity(left.len() + right.len());
    if !spec.kind.keeps_right_columns() {
        out.extend(left.iter().map(|c| JoinColumn {
            name: c.clone(),
            source: JoinSource::Left(c.clone()),
        }));
        return out;
    }

    let right_payload: Vec<&String> = right.iter().filter(|c| !is_right_key(c)).collect();
    let collides = |name: &str| right_payload.iter().any(|r| same(r, name));

    for c in left {
        let column = match key_for_left(c) {
            Some((_, r)) => JoinColumn {
                name: c.clone(),
                source: match spec.kind {
                    JoinKind::Right => JoinSource::Right(right_name(r)),
                    JoinKind::Full => JoinSource::Coalesce(c.clone(), right_name(r)),
                    _ => JoinSource::Left(c.clone()),
                },
            },
            None if collides(c) => JoinColumn {
                name: format!("{}_x", c),
                source: JoinSource::Left(c.clone()),
            },
            None => JoinColumn {
                name: c.clone(),
                source: JoinSource::Left(c.clone()),
            },
        };
        out.push(column);
    }

    for r in right_payload {
        let name = if left.iter().any(|l| same(l, r)) {
            format!("{}_y", r)
        } else {
            r.clone()
        };
        out.push(JoinColumn {
            name,
            source: JoinSource::Right(r.clone()),
        });
    }
    out
}

#[cfg(test)]
#[path = "step_test.rs"]
mod tests;
