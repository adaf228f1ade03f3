//! Immutable relation nodes and the transformation verbs that build them

use crate::error::{LazyError, LazyResult};
use crate::executor;
use crate::expr::Expr;
use crate::oplog::OperationLog;
use crate::session::{SessionId, SessionInner};
use crate::step::{join_columns, Aggregation, JoinSpec, SortKey, Step};
use crate::translate;
use lq_sql::SqlDialect;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

static NEXT_RELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Sentinel stored in the row-count slot until a materialization finishes
const ROW_COUNT_UNKNOWN: usize = usize::MAX;

/// Process-unique relation identifier, increasing in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(u64);

impl RelationId {
    fn next() -> Self {
        Self(NEXT_RELATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the identifier
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Row count of a relation, known only once it has been materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    Unknown,
    Known(usize),
}

/// Where a relation's rows come from
#[derive(Debug, Clone)]
pub enum Origin {
    /// Existing table in the session's engine
    Table(String),
    /// Hand-written query text
    Query(String),
    /// Transformation of another relation
    Derived { parent: Relation, step: Step },
}

struct Node {
    id: RelationId,
    session: Weak<SessionInner>,
    session_id: SessionId,
    dialect: Arc<dyn SqlDialect>,
    origin: Origin,
    columns: Option<Arc<[String]>>,
    row_count: AtomicUsize,
    query_text: OnceLock<String>,
}

/// A lazily evaluated query.
///
/// Cloning is cheap and shares the node. Every transformation returns a new
/// relation whose parent is this one; nothing is sent to the engine until
/// [`Relation::materialize`] or [`Relation::count`] runs.
#[derive(Clone)]
pub struct Relation {
    node: Arc<Node>,
}

impl Relation {
    /// Base relation over a table or query of `session`
    pub(crate) fn base(
        session: &Arc<SessionInner>,
        origin: Origin,
        columns: Option<Vec<String>>,
    ) -> Self {
        Self::from_node(Node {
            id: RelationId::next(),
            session: Arc::downgrade(session),
            session_id: session.id,
            dialect: Arc::clone(&session.dialect),
            origin,
            columns: columns.map(Arc::from),
            row_count: AtomicUsize::new(ROW_COUNT_UNKNOWN),
            query_text: OnceLock::new(),
        })
    }

    fn from_node(node: Node) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    fn derive(&self, step: Step, columns: Option<Arc<[String]>>) -> Relation {
        let child = Self::from_node(Node {
            id: RelationId::next(),
            session: Weak::clone(&self.node.session),
            session_id: self.node.session_id,
            dialect: Arc::clone(&self.node.dialect),
            origin: Origin::Derived {
                parent: self.clone(),
                step,
            },
            columns,
            row_count: AtomicUsize::new(ROW_COUNT_UNKNOWN),
            query_text: OnceLock::new(),
        });
        log::debug!(
            "{} = {} of {}",
            child.id(),
            child.step().map(Step::name).unwrap_or("base"),
            self.id()
        );
        child
    }

    pub fn id(&self) -> RelationId {
        self.node.id
    }

    pub fn session_id(&self) -> SessionId {
        self.node.session_id
    }

    /// Dialect the relation is translated to
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.node.dialect.as_ref()
    }

    pub fn origin(&self) -> &Origin {
        &self.node.origin
    }

    /// Parent relation, `None` for a base relation
    pub fn parent(&self) -> Option<&Relation> {
        match &self.node.origin {
            Origin::Derived { parent, .. } => Some(parent),
            _ => None,
        }
    }

    /// Step that produced this relation, `None` for a base relation
    pub fn step(&self) -> Option<&Step> {
        match &self.node.origin {
            Origin::Derived { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Output column names, `None` when they cannot be known without running
    /// the query (after a raw fragment, for instance)
    pub fn columns(&self) -> Option<&[String]> {
        self.node.columns.as_deref()
    }

    pub(crate) fn shared_columns(&self) -> Option<Arc<[String]>> {
        self.node.columns.clone()
    }

    /// Row count recorded by the latest materialization
    pub fn row_count(&self) -> RowCount {
        match self.node.row_count.load(Ordering::Acquire) {
            ROW_COUNT_UNKNOWN => RowCount::Unknown,
            n => RowCount::Known(n),
        }
    }

    pub(crate) fn set_row_count(&self, rows: usize) {
        self.node
            .row_count
            .store(rows.min(ROW_COUNT_UNKNOWN - 1), Ordering::Release);
    }

    /// Whether both relations belong to the same session
    pub fn same_session(&self, other: &Relation) -> bool {
        self.node.session_id == other.node.session_id
    }

    /// Steps from the base relation to this one
    pub fn operation_log(&self) -> OperationLog {
        OperationLog::of(self)
    }

    pub(crate) fn session(&self) -> LazyResult<Arc<SessionInner>> {
        self.node
            .session
            .upgrade()
            .ok_or_else(|| LazyError::SessionClosed {
                session: self.node.session_id,
            })
    }

    fn ensure_open(&self) -> LazyResult<()> {
        self.session()?.ensure_open()
    }

    /// Translated SQL for the relation's own dialect, computed once
    pub(crate) fn query_text(&self) -> LazyResult<String> {
        if let Some(text) = self.node.query_text.get() {
            return Ok(text.clone());
        }
        let text = translate::translate(self, self.dialect())?;
        Ok(self.node.query_text.get_or_init(|| text).clone())
    }

    /// Translated SQL without running it
    pub fn show_query(&self) -> LazyResult<String> {
        executor::peek_query_text(self)
    }

    /// Run the query and return its rows
    pub async fn materialize(&self) -> LazyResult<crate::result::RealizedResult> {
        executor::materialize(self).await
    }

    /// Count the rows of the query without fetching them
    pub async fn count(&self) -> LazyResult<usize> {
        executor::count_rows(self).await
    }

    pub(crate) fn require_columns<'a>(
        &self,
        operation: &'static str,
        names: impl IntoIterator<Item = &'a str>,
    ) -> LazyResult<()> {
        let Some(available) = self.columns() else {
            return Ok(());
        };
        for name in names {
            if !available.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                return Err(LazyError::Schema {
                    relation: self.id(),
                    operation,
                    column: name.to_string(),
                    available: available.join(", "),
                });
            }
        }
        Ok(())
    }

    /// Keep only `columns`, in the given order
    pub fn project<S: Into<String>>(
        &self,
        columns: impl IntoIterator<Item = S>,
    ) -> LazyResult<Relation> {
        self.ensure_open()?;
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(LazyError::Translation {
                relation: self.id(),
                operation: "project".to_string(),
                dialect: self.dialect().name(),
                reason: "a projection needs at least one column".to_string(),
            });
        }
        self.require_columns("project", columns.iter().map(String::as_str))?;
        let out: Arc<[String]> = Arc::from(columns.clone());
        Ok(self.derive(Step::Project(columns), Some(out)))
    }

    /// Keep rows where `predicate` holds
    pub fn filter_by(&self, predicate: Expr) -> LazyResult<Relation> {
        self.ensure_open()?;
        self.require_columns("filter", predicate.referenced_columns())?;
        Ok(self.derive(Step::Filter(predicate), self.shared_columns()))
    }

    /// Group by `group_keys` and compute `aggregations` per group.
    ///
    /// No keys means one group over the whole input. Output columns are the
    /// keys followed by the aggregation outputs.
    pub fn group_aggregate<S: Into<String>>(
        &self,
        group_keys: impl IntoIterator<Item = S>,
        aggregations: impl IntoIterator<Item = Aggregation>,
    ) -> LazyResult<Relation> {
        self.ensure_open()?;
        let group_keys: Vec<String> = group_keys.into_iter().map(Into::into).collect();
        let aggregations: Vec<Aggregation> = aggregations.into_iter().collect();

        self.require_columns("aggregate", group_keys.iter().map(String::as_str))?;
        for agg in &aggregations {
            if let Some(arg) = &agg.argument {
                self.require_columns("aggregate", arg.referenced_columns())?;
            }
        }

        let out: Vec<String> = group_keys
            .iter()
            .cloned()
            .chain(aggregations.iter().map(|a| a.output.clone()))
            .collect();
        Ok(self.derive(
            Step::Aggregate {
                group_keys,
                aggregations,
            },
            Some(Arc::from(out)),
        ))
    }

    /// Order rows by `keys`; a later sort replaces this one
    pub fn sort_by(&self, keys: impl IntoIterator<Item = SortKey>) -> LazyResult<Relation> {
        self.ensure_open()?;
        let keys: Vec<SortKey> = keys.into_iter().collect();
        self.require_columns("sort", keys.iter().map(|k| k.column.as_str()))?;
        Ok(self.derive(Step::Sort(keys), self.shared_columns()))
    }

    /// Join with `other`.
    ///
    /// `other` must belong to the same session unless `spec.copy` is set;
    /// that is checked when the relation is translated.
    pub fn join(&self, other: &Relation, spec: JoinSpec) -> LazyResult<Relation> {
        self.ensure_open()?;
        let keys = spec.effective_keys();
        self.require_columns("join", keys.iter().map(|(l, _)| l.as_str()))?;
        other.require_columns("join", keys.iter().map(|(_, r)| r.as_str()))?;

        let out: Option<Arc<[String]>> = if !spec.kind.keeps_right_columns() {
            self.shared_columns()
        } else {
            match (self.columns(), other.columns()) {
                (Some(left), Some(right)) => Some(
                    join_columns(left, right, &spec)
                        .into_iter()
                        .map(|c| c.name)
                        .collect(),
                ),
                _ => None,
            }
        };
        Ok(self.derive(
            Step::Join {
                other: other.clone(),
                spec,
            },
            out,
        ))
    }

    /// Append SQL text verbatim as a clause over the current rows, for
    /// example `"WHERE a % 2 = 0"` or `"QUALIFY ..."`.
    ///
    /// The text is never validated, and the output columns become unknown.
    pub fn inject_raw(&self, fragment: impl Into<String>) -> LazyResult<Relation> {
        self.ensure_open()?;
        Ok(self.derive(Step::RawQueryFragment(fragment.into()), None))
    }

    /// Add computed columns, replacing existing columns of the same name
    pub fn mutate<S: Into<String>>(
        &self,
        items: impl IntoIterator<Item = (S, Expr)>,
    ) -> LazyResult<Relation> {
        self.ensure_open()?;
        let items: Vec<(String, Expr)> = items
            .into_iter()
            .map(|(name, expr)| (name.into(), expr))
            .collect();
        for (_, expr) in &items {
            self.require_columns("mutate", expr.referenced_columns())?;
        }

        let out = self.columns().map(|input| {
            let mut out: Vec<String> = input.to_vec();
            for (name, _) in &items {
                if !out.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                    out.push(name.clone());
                }
            }
            Arc::from(out)
        });
        Ok(self.derive(Step::Mutate(items), out))
    }

    /// Keep at most `n` rows
    pub fn limit(&self, n: u64) -> LazyResult<Relation> {
        self.ensure_open()?;
        Ok(self.derive(Step::Limit(n), self.shared_columns()))
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("id", &self.node.id)
            .field("session", &self.node.session_id)
            .field("dialect", &self.node.dialect.name())
            .field("columns", &self.node.columns)
            .field("step", &self.step().map(Step::name))
            .finish()
    }
}

#[cfg(test)]
#[path = "relation_test.rs"]
mod tests;
