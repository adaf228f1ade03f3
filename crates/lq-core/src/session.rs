//! Sessions: one engine connection and the base relations bound to it
//!
//! A session moves through `Created -> Open -> Closed`. Relations keep only a
//! weak link back to it, so dropping every `Session` handle releases the
//! connection even while relations are still alive; those relations then
//! fail with `SessionClosed` like relations of an explicitly closed session.

use crate::config::{Config, DatabaseConfig};
use crate::error::{LazyError, LazyResult};
use crate::relation::{Origin, Relation};
use crate::result::RealizedResult;
use lq_db::{CreateTableOptions, Database, DbError, DuckDbBackend, TableData};
use lq_sql::{DialectKind, SqlDialect, SqlParser};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Configured, not yet connected
    Created,
    /// Connected and usable
    Open,
    /// Connection released; terminal
    Closed,
}

enum Lifecycle {
    Created(DatabaseConfig),
    Open(Arc<dyn Database>),
    Closed,
}

pub(crate) struct SessionInner {
    pub(crate) id: SessionId,
    pub(crate) dialect: Arc<dyn SqlDialect>,
    lifecycle: Mutex<Lifecycle>,
    /// Serializes engine calls; tokio's mutex hands out the lock in FIFO order
    exec_lock: tokio::sync::Mutex<()>,
    tables: Mutex<HashMap<String, Relation>>,
}

impl SessionInner {
    fn new(dialect: DialectKind, lifecycle: Lifecycle) -> Self {
        Self {
            id: SessionId::new(),
            dialect: Arc::from(dialect.profile()),
            lifecycle: Mutex::new(lifecycle),
            exec_lock: tokio::sync::Mutex::new(()),
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<String, Relation>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SessionState {
        match &*self.lifecycle() {
            Lifecycle::Created(_) => SessionState::Created,
            Lifecycle::Open(_) => SessionState::Open,
            Lifecycle::Closed => SessionState::Closed,
        }
    }

    /// Connection handle of an open session
    pub(crate) fn database(&self) -> LazyResult<Arc<dyn Database>> {
        match &*self.lifecycle() {
            Lifecycle::Open(db) => Ok(Arc::clone(db)),
            Lifecycle::Created(_) => Err(LazyError::SessionNotOpen { session: self.id }),
            Lifecycle::Closed => Err(LazyError::SessionClosed { session: self.id }),
        }
    }

    pub(crate) fn ensure_open(&self) -> LazyResult<()> {
        self.database().map(|_| ())
    }

    /// Wait for this session's turn on the connection.
    ///
    /// The state is checked after the lock is granted, so callers queued
    /// behind a `close` fail without touching the engine.
    pub(crate) async fn acquire(
        &self,
    ) -> LazyResult<(tokio::sync::MutexGuard<'_, ()>, Arc<dyn Database>)> {
        let guard = self.exec_lock.lock().await;
        let db = self.database()?;
        Ok((guard, db))
    }
}

/// Handle to one engine connection.
///
/// Cloning shares the session. All relations created through it translate to
/// the session's dialect and run on its connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create and connect a session
    pub fn open(config: &Config) -> LazyResult<Session> {
        let session = Self::create(config)?;
        session.connect()?;
        Ok(session)
    }

    /// Create a session without connecting it
    pub fn create(config: &Config) -> LazyResult<Session> {
        config.validate()?;
        if config.dialect != DialectKind::DuckDb {
            log::warn!(
                "Session dialect is {} but the engine is DuckDB; translated SQL may not run",
                config.dialect
            );
        }
        let inner = SessionInner::new(config.dialect, Lifecycle::Created(config.database.clone()));
        log::debug!("Created session {} ({})", inner.id, config.dialect);
        Ok(Session {
            inner: Arc::new(inner),
        })
    }

    /// Open the connection of a created session; a no-op when already open
    pub fn connect(&self) -> LazyResult<()> {
        let mut lifecycle = self.inner.lifecycle();
        let path = match &*lifecycle {
            Lifecycle::Created(database) => database.path.clone(),
            Lifecycle::Open(_) => return Ok(()),
            Lifecycle::Closed => {
                return Err(LazyError::SessionClosed {
                    session: self.inner.id,
                })
            }
        };
        let backend = DuckDbBackend::new(&path)?;
        log::debug!(
            "Session {} connected to {} ({})",
            self.inner.id,
            path,
            backend.db_type()
        );
        *lifecycle = Lifecycle::Open(Arc::new(backend));
        Ok(())
    }

    /// Open session over an existing backend
    pub fn with_database(db: Arc<dyn Database>, dialect: DialectKind) -> Session {
        let engine = db.db_type();
        let inner = SessionInner::new(dialect, Lifecycle::Open(db));
        log::debug!("Opened session {} over {} ({})", inner.id, engine, dialect);
        Session {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn dialect(&self) -> DialectKind {
        self.inner.dialect.kind()
    }

    /// Base relation for an existing table.
    ///
    /// The relation is created on first use and cached, so binding the same
    /// name twice returns the same relation.
    pub async fn bind(&self, table: &str) -> LazyResult<Relation> {
        self.inner.ensure_open()?;
        let cached = self.inner.tables().get(table).cloned();
        if let Some(relation) = cached {
            return Ok(relation);
        }

        let columns = {
            let (_guard, db) = self.inner.acquire().await?;
            match db.table_columns(table).await {
                Ok(columns) => columns,
                Err(DbError::TableNotFound(_)) => {
                    return Err(LazyError::UnknownTable {
                        table: table.to_string(),
                        session: self.inner.id,
                    })
                }
                Err(e) => return Err(e.into()),
            }
        };

        let relation = Relation::base(&self.inner, Origin::Table(table.to_string()), Some(columns));
        let bound = self
            .inner
            .tables()
            .entry(table.to_string())
            .or_insert(relation)
            .clone();
        Ok(bound)
    }

    /// Create (or replace) table `name` from in-memory rows and bind it.
    ///
    /// Each entry of `index_hints` is a column group that gets its own
    /// secondary index. Indexes only speed up later filters and joins.
    pub async fn load_table(
        &self,
        name: &str,
        data: TableData,
        index_hints: &[&[&str]],
    ) -> LazyResult<Relation> {
        self.inner.ensure_open()?;
        let relation = Relation::base(
            &self.inner,
            Origin::Table(name.to_string()),
            Some(data.columns.clone()),
        );
        for group in index_hints {
            relation.require_columns("load_table", group.iter().copied())?;
        }

        {
            let (_guard, db) = self.inner.acquire().await?;
            let options = CreateTableOptions {
                replace: true,
                temporary: false,
            };
            db.create_table(name, &data, options).await?;
            for group in index_hints.iter().filter(|g| !g.is_empty()) {
                let columns: Vec<String> = group.iter().map(|c| c.to_string()).collect();
                db.create_index(name, &index_name(name, group), &columns)
                    .await?;
            }
        }
        log::debug!(
            "Loaded {} rows into '{}' ({} indexes) in session {}",
            data.rows.len(),
            name,
            index_hints.len(),
            self.inner.id
        );

        self.inner
            .tables()
            .insert(name.to_string(), relation.clone());
        Ok(relation)
    }

    /// Base relation over hand-written SQL.
    ///
    /// The text must parse as exactly one query in the session's dialect. Its
    /// output columns are taken from the engine without running it.
    pub async fn sql(&self, query: &str) -> LazyResult<Relation> {
        self.inner.ensure_open()?;
        let parser = SqlParser::new(self.dialect());
        parser.parse_query(query)?;
        let text = query.trim().trim_end_matches(';').trim_end().to_string();

        let described = {
            let (_guard, db) = self.inner.acquire().await?;
            db.describe_query(&text)
                .await
                .map_err(|source| LazyError::Execution {
                    relation: None,
                    sql: text.clone(),
                    source,
                })?
        };
        let columns = described.into_iter().map(|(name, _)| name).collect();
        Ok(Relation::base(&self.inner, Origin::Query(text), Some(columns)))
    }

    /// Run SQL directly and return its rows, bypassing relations
    pub async fn query(&self, sql: &str) -> LazyResult<RealizedResult> {
        let (_guard, db) = self.inner.acquire().await?;
        let rows = db.query(sql).await.map_err(|source| LazyError::Execution {
            relation: None,
            sql: sql.to_string(),
            source,
        })?;
        self.inner.ensure_open()?;
        Ok(RealizedResult::from_query_rows(rows))
    }

    /// Release the connection.
    ///
    /// Materializations already running finish their engine call and then
    /// fail with `SessionClosed`; queued ones fail without running. Closing
    /// twice fails with `AlreadyClosed`.
    pub fn close(&self) -> LazyResult<()> {
        {
            let mut lifecycle = self.inner.lifecycle();
            if matches!(*lifecycle, Lifecycle::Closed) {
                return Err(LazyError::AlreadyClosed {
                    session: self.inner.id,
                });
            }
            *lifecycle = Lifecycle::Closed;
        }
        self.inner.tables().clear();
        log::debug!("Closed session {}", self.inner.id);
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("dialect", &self.inner.dialect.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Deterministic index name for a column group
fn index_name(table: &str, columns: &[&str]) -> String {
    let raw = format!("idx_{}_{}", table, columns.join("_"));
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
