//! Materialization: translate once, run once, realize rows

use crate::error::{LazyError, LazyResult};
use crate::relation::Relation;
use crate::result::RealizedResult;
use crate::step::Step;
use crate::translate::copy_table_name;
use lq_db::{CreateTableOptions, Database, TableData};
use std::future::Future;
use std::pin::Pin;

/// Boxed future; materialization recurses into foreign join sides
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Translated SQL of `relation` without contacting the engine
pub fn peek_query_text(relation: &Relation) -> LazyResult<String> {
    relation.session()?.ensure_open()?;
    relation.query_text()
}

/// Run `relation` on its session's connection and return the rows.
///
/// Results are never cached; every call re-executes. Engine failures are
/// returned as `Execution` errors and are not retried.
pub fn materialize(relation: &Relation) -> BoxFuture<'_, LazyResult<RealizedResult>> {
    Box::pin(async move {
        let session = relation.session()?;
        session.ensure_open()?;
        let sql = relation.query_text()?;
        let copies = fetch_copies(relation).await?;

        let (_guard, db) = session.acquire().await?;
        load_copies(db.as_ref(), relation, &copies).await?;
        log::debug!("Materializing {} in session {}", relation.id(), relation.session_id());
        let outcome = db.query(&sql).await;

        // close() may have run while the engine was busy
        session.ensure_open()?;
        let rows = outcome.map_err(|source| LazyError::Execution {
            relation: Some(relation.id()),
            sql: sql.clone(),
            source,
        })?;
        relation.set_row_count(rows.rows.len());
        Ok(RealizedResult::from_query_rows(rows))
    })
}

/// Number of rows `relation` yields, computed by the engine
pub async fn count_rows(relation: &Relation) -> LazyResult<usize> {
    let session = relation.session()?;
    session.ensure_open()?;
    let sql = relation.query_text()?;
    let copies = fetch_copies(relation).await?;

    let (_guard, db) = session.acquire().await?;
    load_copies(db.as_ref(), relation, &copies).await?;
    let outcome = db.query_count(&sql).await;

    session.ensure_open()?;
    let count = outcome.map_err(|source| LazyError::Execution {
        relation: Some(relation.id()),
        sql,
        source,
    })?;
    relation.set_row_count(count);
    Ok(count)
}

/// Foreign join sides flagged for copying, materialized in their own sessions.
///
/// Runs before the local lock is taken so two sessions copying from each
/// other cannot wait on one another.
async fn fetch_copies(relation: &Relation) -> LazyResult<Vec<(String, TableData)>> {
    let mut copies = Vec::new();
    for foreign in foreign_join_sides(relation) {
        log::warn!(
            "Copying {} from session {} into session {} for a join; the whole side is loaded into memory",
            foreign.id(),
            foreign.session_id(),
            relation.session_id()
        );
        let realized = materialize(&foreign).await?;
        copies.push((copy_table_name(foreign.id()), realized.into_table_data()));
    }
    Ok(copies)
}

async fn load_copies(
    db: &dyn Database,
    relation: &Relation,
    copies: &[(String, TableData)],
) -> LazyResult<()> {
    let options = CreateTableOptions {
        replace: true,
        temporary: true,
    };
    for (table, data) in copies {
        db.create_table(table, data, options)
            .await
            .map_err(|source| LazyError::Execution {
                relation: Some(relation.id()),
                sql: format!("CREATE TEMP TABLE {}", table),
                source,
            })?;
    }
    Ok(())
}

/// Join sides from other sessions reachable through same-session relations,
/// deduplicated
fn foreign_join_sides(relation: &Relation) -> Vec<Relation> {
    let mut found: Vec<Relation> = Vec::new();
    let mut pending = vec![relation.clone()];
    while let Some(current) = pending.pop() {
        for step in current.operation_log().steps() {
            let Step::Join { other, .. } = step else {
                continue;
            };
            if other.same_session(relation) {
                pending.push(other.clone());
            } else if !found.iter().any(|f| f.id() == other.id()) {
                found.push(other.clone());
            }
        }
    }
    found
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
