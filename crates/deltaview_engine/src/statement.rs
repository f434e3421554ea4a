//! Fluent statement builder.
//!
//! Builds the structural [`Statement`] values the flushers hand to the
//! session, including collection-path joins and positional `INDEX(path)`
//! predicates used by the indexed-list flusher.

use crate::session::{Predicate, Statement, StatementKind};
use deltaview_model::ScalarValue;

/// Fluent builder over [`Statement`].
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    statement: Statement,
}

impl StatementBuilder {
    /// Starts an update statement on an entity.
    #[must_use]
    pub fn update(entity: impl Into<String>) -> Self {
        Self {
            statement: Statement::new(StatementKind::Update, entity),
        }
    }

    /// Starts a delete statement on an entity.
    #[must_use]
    pub fn delete(entity: impl Into<String>) -> Self {
        Self {
            statement: Statement::new(StatementKind::Delete, entity),
        }
    }

    /// Starts an insert statement on an entity.
    #[must_use]
    pub fn insert(entity: impl Into<String>) -> Self {
        Self {
            statement: Statement::new(StatementKind::Insert, entity),
        }
    }

    /// Starts a select statement on an entity.
    #[must_use]
    pub fn select(entity: impl Into<String>) -> Self {
        Self {
            statement: Statement::new(StatementKind::Select, entity),
        }
    }

    /// Targets the collection table joined on `path`.
    ///
    /// Positional predicates (`where_index`, `where_index_range`) refer to
    /// this path and require it to be set first.
    #[must_use]
    pub fn collection(mut self, path: impl Into<String>) -> Self {
        self.statement.collection_path = Some(path.into());
        self
    }

    /// Adds a column assignment.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: ScalarValue) -> Self {
        self.statement.assignments.push((column.into(), value));
        self
    }

    /// Adds a null column assignment.
    #[must_use]
    pub fn set_null(self, column: impl Into<String>) -> Self {
        self.set(column, ScalarValue::Null)
    }

    /// Shifts the positional index of matching rows by `offset`.
    #[must_use]
    pub fn shift_index(mut self, offset: i64) -> Self {
        self.statement.index_shift = Some(offset);
        self
    }

    /// Inserts at the given position of an indexed collection.
    #[must_use]
    pub fn at_position(mut self, position: i64) -> Self {
        self.statement.position = Some(position);
        self
    }

    /// Adds an equality predicate.
    #[must_use]
    pub fn where_eq(mut self, path: impl Into<String>, value: ScalarValue) -> Self {
        self.statement.predicates.push(Predicate::Eq {
            path: path.into(),
            value,
        });
        self
    }

    /// Adds an `IS NULL` predicate.
    #[must_use]
    pub fn where_null(mut self, path: impl Into<String>) -> Self {
        self.statement
            .predicates
            .push(Predicate::IsNull { path: path.into() });
        self
    }

    /// Adds a positional equality predicate on the collection path.
    #[must_use]
    pub fn where_index(mut self, index: i64) -> Self {
        let path = self.statement.collection_path.clone().unwrap_or_default();
        self.statement
            .predicates
            .push(Predicate::IndexEq { path, index });
        self
    }

    /// Adds a positional range predicate on the collection path; `start`
    /// inclusive, `end` exclusive.
    #[must_use]
    pub fn where_index_range(mut self, start: i64, end: i64) -> Self {
        let path = self.statement.collection_path.clone().unwrap_or_default();
        self.statement
            .predicates
            .push(Predicate::IndexBetween { path, start, end });
        self
    }

    /// Requests the given columns back from the statement.
    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statement
            .returning
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// Finishes the statement.
    #[must_use]
    pub fn build(self) -> Statement {
        self.statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_with_assignments_and_predicates() {
        let stmt = StatementBuilder::update("posts")
            .set("title", ScalarValue::Text("x".into()))
            .where_eq("id", ScalarValue::Integer(1))
            .build();
        assert_eq!(stmt.kind, StatementKind::Update);
        assert_eq!(stmt.assignments.len(), 1);
        assert_eq!(
            stmt.predicates,
            vec![Predicate::Eq {
                path: "id".into(),
                value: ScalarValue::Integer(1)
            }]
        );
    }

    #[test]
    fn positional_predicates_use_collection_path() {
        let stmt = StatementBuilder::delete("posts")
            .collection("comments")
            .where_eq("post_id", ScalarValue::Integer(1))
            .where_index_range(2, 5)
            .build();
        assert_eq!(stmt.collection_path.as_deref(), Some("comments"));
        assert!(matches!(
            &stmt.predicates[1],
            Predicate::IndexBetween { path, start: 2, end: 5 } if path == "comments"
        ));
    }

    #[test]
    fn shift_and_position() {
        let shift = StatementBuilder::update("posts")
            .collection("comments")
            .shift_index(-1)
            .build();
        assert_eq!(shift.index_shift, Some(-1));

        let insert = StatementBuilder::insert("posts")
            .collection("comments")
            .at_position(3)
            .build();
        assert_eq!(insert.position, Some(3));
    }

    #[test]
    fn empty_update_detection() {
        let stmt = StatementBuilder::update("posts")
            .where_eq("id", ScalarValue::Integer(1))
            .build();
        assert!(stmt.is_empty_update());
    }
}
