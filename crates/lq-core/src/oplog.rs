//! Operation log: the ordered steps between a base relation and a relation

use crate::relation::{Origin, Relation};
use crate::step::Step;
use std::fmt;

/// Steps from the nearest base relation to a relation, oldest first.
///
/// Rebuilt on demand by walking parent links; relations never store it.
#[derive(Debug, Clone)]
pub struct OperationLog {
    base: Relation,
    /// Derived relations in chain order; each carries the step that made it
    nodes: Vec<Relation>,
}

impl OperationLog {
    /// Collect the log of `relation`
    pub fn of(relation: &Relation) -> Self {
        let mut nodes = Vec::new();
        let mut current = relation;
        while let Some(parent) = current.parent() {
            nodes.push(current.clone());
            current = parent;
        }
        nodes.reverse();
        Self {
            base: current.clone(),
            nodes,
        }
    }

    /// Base relation the chain starts from
    pub fn base(&self) -> &Relation {
        &self.base
    }

    /// Relations produced by each step, oldest first
    pub fn nodes(&self) -> &[Relation] {
        &self.nodes
    }

    /// Steps in chain order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.nodes.iter().filter_map(Relation::step)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Display for OperationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base.origin() {
            Origin::Table(name) => writeln!(f, "{}: table {}", self.base.id(), name)?,
            Origin::Query(sql) => writeln!(f, "{}: query {:?}", self.base.id(), sql)?,
            Origin::Derived { .. } => writeln!(f, "{}: derived", self.base.id())?,
        }
        for node in &self.nodes {
            if let Some(step) = node.step() {
                writeln!(f, "{}: {}", node.id(), step)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::{col, lit};
    use crate::step::SortKey;
    use crate::test_utils::loaded_session;

    #[tokio::test]
    async fn test_log_is_oldest_first() {
        let (session, _db) = loaded_session().await;
        let t = session.bind("t").await.unwrap();
        let rel = t
            .filter_by(col("a").gt(lit(1)))
            .unwrap()
            .sort_by([SortKey::desc("b")])
            .unwrap()
            .project(["b"])
            .unwrap();

        let log = rel.operation_log();
        assert_eq!(log.base().id(), t.id());
        assert_eq!(log.len(), 3);
        let names: Vec<&str> = log.steps().map(|s| s.name()).collect();
        assert_eq!(names, vec!["filter", "sort", "project"]);
        assert_eq!(log.nodes().last().unwrap().id(), rel.id());
    }

    #[tokio::test]
    async fn test_base_log_is_empty() {
        let (session, _db) = loaded_session().await;
        let t = session.bind("t").await.unwrap();
        let log = t.operation_log();
        assert!(log.is_empty());
        assert_eq!(log.to_string(), format!("{}: table t\n", t.id()));
    }

    #[tokio::test]
    async fn test_display_one_step_per_line() {
        let (session, _db) = loaded_session().await;
        let t = session.bind("t").await.unwrap();
        let rel = t.filter_by(col("a").gt(lit(1))).unwrap().limit(5).unwrap();
        let text = rel.operation_log().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("filter((a > 1))"));
        assert!(lines[2].ends_with("limit(5)"));
    }
}
