//! In-memory store session.
//!
//! Executes the structural statement model against in-memory tables and
//! records every executed statement in a log, so tests can assert both the
//! final store content and the exact operation sequence the engine issued.

use deltaview_engine::{
    Predicate, SessionError, SessionResult, Statement, StatementKind, StoreSession,
};
use deltaview_model::{AttributeValue, ObjectId, Record, RecordRef, ScalarValue};
use std::collections::{BTreeMap, HashMap};

/// One row of a collection table.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRow {
    /// Named column values.
    pub fields: BTreeMap<String, ScalarValue>,
    /// Positional index, for indexed collections.
    pub index: Option<i64>,
}

impl CollectionRow {
    fn matches(&self, predicates: &[Predicate]) -> bool {
        predicates.iter().all(|predicate| match predicate {
            Predicate::Eq { path, value } => self.fields.get(path) == Some(value),
            Predicate::IsNull { path } => self
                .fields
                .get(path)
                .map(ScalarValue::is_null)
                .unwrap_or(true),
            Predicate::IndexEq { index, .. } => self.index == Some(*index),
            Predicate::IndexBetween { start, end, .. } => self
                .index
                .map(|index| index >= *start && index < *end)
                .unwrap_or(false),
        })
    }
}

/// An in-memory session over entity and collection tables.
#[derive(Default)]
pub struct MemorySession {
    entities: HashMap<String, BTreeMap<ScalarValue, RecordRef>>,
    collections: HashMap<(String, String), Vec<CollectionRow>>,
    statements: Vec<Statement>,
    returning_supported: bool,
}

impl MemorySession {
    /// Creates an empty session without RETURNING support.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables RETURNING support, so deletes hand back column values
    /// without a fallback select.
    #[must_use]
    pub fn with_returning_support(mut self) -> Self {
        self.returning_supported = true;
        self
    }

    /// Seeds an entity row.
    pub fn seed_record(&mut self, record: Record) -> RecordRef {
        let entity = record.entity().to_string();
        let id = record.id().cloned().unwrap_or(ScalarValue::Null);
        let record = record.wrap();
        self.entities
            .entry(entity)
            .or_default()
            .insert(id, RecordRef::clone(&record));
        record
    }

    /// Seeds a collection row.
    pub fn seed_collection_row(
        &mut self,
        entity: &str,
        path: &str,
        fields: Vec<(String, ScalarValue)>,
        index: Option<i64>,
    ) {
        self.collections
            .entry((entity.to_string(), path.to_string()))
            .or_default()
            .push(CollectionRow {
                fields: fields.into_iter().collect(),
                index,
            });
    }

    /// Returns the executed statement log.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Returns the entity row for an id, if present.
    #[must_use]
    pub fn record(&self, entity: &str, id: &ScalarValue) -> Option<RecordRef> {
        self.entities.get(entity)?.get(id).cloned()
    }

    /// Returns the collection rows for a path, ordered by index where
    /// present.
    #[must_use]
    pub fn collection_rows(&self, entity: &str, path: &str) -> Vec<CollectionRow> {
        let mut rows = self
            .collections
            .get(&(entity.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|row| row.index);
        rows
    }

    fn record_matches(record: &RecordRef, predicates: &[Predicate]) -> bool {
        let guard = record.read();
        predicates.iter().all(|predicate| match predicate {
            Predicate::Eq { path, value } => match guard.get(path) {
                Some(AttributeValue::Scalar(scalar)) => scalar == value,
                Some(_) => false,
                None => guard.id() == Some(value) && path == "id",
            },
            Predicate::IsNull { path } => match guard.get(path) {
                Some(value) => value.is_null(),
                None => true,
            },
            Predicate::IndexEq { .. } | Predicate::IndexBetween { .. } => false,
        })
    }

    fn read_row(record: &RecordRef, columns: &[String]) -> Vec<ScalarValue> {
        let guard = record.read();
        columns
            .iter()
            .map(|column| match guard.get(column) {
                Some(AttributeValue::Scalar(scalar)) => scalar.clone(),
                _ => ScalarValue::Null,
            })
            .collect()
    }

    fn execute_collection(&mut self, statement: &Statement, path: &str) -> SessionResult<u64> {
        let key = (statement.entity.clone(), path.to_string());
        let rows = self.collections.entry(key).or_default();
        match statement.kind {
            StatementKind::Insert => {
                rows.push(CollectionRow {
                    fields: statement.assignments.iter().cloned().collect(),
                    index: statement.position,
                });
                Ok(1)
            }
            StatementKind::Update => {
                let mut affected = 0;
                for row in rows.iter_mut() {
                    if !row.matches(&statement.predicates) {
                        continue;
                    }
                    for (column, value) in &statement.assignments {
                        row.fields.insert(column.clone(), value.clone());
                    }
                    if let (Some(shift), Some(index)) = (statement.index_shift, row.index) {
                        row.index = Some(index + shift);
                    }
                    affected += 1;
                }
                Ok(affected)
            }
            StatementKind::Delete => {
                let before = rows.len();
                rows.retain(|row| !row.matches(&statement.predicates));
                Ok((before - rows.len()) as u64)
            }
            StatementKind::Select => Err(SessionError::backend(
                "collection selects are not supported by the memory session",
            )),
        }
    }

    fn execute_entity(&mut self, statement: &Statement) -> SessionResult<u64> {
        let table = self.entities.entry(statement.entity.clone()).or_default();
        match statement.kind {
            StatementKind::Insert => {
                let mut record = Record::new(statement.entity.clone());
                for (column, value) in &statement.assignments {
                    record.set(column.clone(), AttributeValue::Scalar(value.clone()));
                    if column == "id" {
                        record.set_id(value.clone());
                    }
                }
                let id = record.id().cloned().unwrap_or(ScalarValue::Null);
                table.insert(id, record.wrap());
                Ok(1)
            }
            StatementKind::Update => {
                let mut affected = 0;
                for record in table.values() {
                    if !Self::record_matches(record, &statement.predicates) {
                        continue;
                    }
                    let mut guard = record.write();
                    for (column, value) in &statement.assignments {
                        guard.set(column.clone(), AttributeValue::Scalar(value.clone()));
                    }
                    affected += 1;
                }
                Ok(affected)
            }
            StatementKind::Delete => {
                let matching: Vec<ScalarValue> = table
                    .iter()
                    .filter(|(_, record)| Self::record_matches(record, &statement.predicates))
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in &matching {
                    table.remove(id);
                }
                Ok(matching.len() as u64)
            }
            StatementKind::Select => Ok(table
                .values()
                .filter(|record| Self::record_matches(record, &statement.predicates))
                .count() as u64),
        }
    }
}

impl StoreSession for MemorySession {
    fn execute(&mut self, statement: &Statement) -> SessionResult<u64> {
        self.statements.push(statement.clone());
        match &statement.collection_path {
            Some(path) => {
                let path = path.clone();
                self.execute_collection(statement, &path)
            }
            None => self.execute_entity(statement),
        }
    }

    fn execute_returning(&mut self, statement: &Statement) -> SessionResult<Vec<Vec<ScalarValue>>> {
        self.statements.push(statement.clone());
        if statement.collection_path.is_some() {
            return Err(SessionError::backend(
                "collection statements cannot return values",
            ));
        }
        let table = self.entities.entry(statement.entity.clone()).or_default();
        let matching: Vec<(ScalarValue, RecordRef)> = table
            .iter()
            .filter(|(_, record)| Self::record_matches(record, &statement.predicates))
            .map(|(id, record)| (id.clone(), RecordRef::clone(record)))
            .collect();
        let rows = matching
            .iter()
            .map(|(_, record)| Self::read_row(record, &statement.returning))
            .collect();
        if statement.kind == StatementKind::Delete {
            for (id, _) in &matching {
                table.remove(id);
            }
        }
        Ok(rows)
    }

    fn supports_returning(&self) -> bool {
        self.returning_supported
    }

    fn persist(&mut self, record: &RecordRef) -> SessionResult<()> {
        let (entity, id) = {
            let mut guard = record.write();
            if guard.id().is_none() {
                guard.set_id(ScalarValue::Id(ObjectId::new()));
            }
            let id = guard.id().cloned().unwrap_or(ScalarValue::Null);
            guard.set("id".to_string(), AttributeValue::Scalar(id.clone()));
            (guard.entity().to_string(), id)
        };
        self.entities
            .entry(entity)
            .or_default()
            .insert(id, RecordRef::clone(record));
        Ok(())
    }

    fn load(&mut self, entity: &str, id: &ScalarValue) -> SessionResult<Option<RecordRef>> {
        Ok(self
            .entities
            .get(entity)
            .and_then(|table| table.get(id))
            .cloned())
    }

    fn get_reference(&mut self, entity: &str, id: &ScalarValue) -> SessionResult<RecordRef> {
        if let Some(record) = self.load(entity, id)? {
            return Ok(record);
        }
        let record = Record::with_id(entity, id.clone()).wrap();
        self.entities
            .entry(entity.to_string())
            .or_default()
            .insert(id.clone(), RecordRef::clone(&record));
        Ok(record)
    }

    fn remove(&mut self, entity: &str, id: &ScalarValue) -> SessionResult<()> {
        let removed = self
            .entities
            .get_mut(entity)
            .and_then(|table| table.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(SessionError::not_found(entity, format!("id {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltaview_engine::StatementBuilder;

    #[test]
    fn entity_update_matches_by_field() {
        let mut session = MemorySession::new();
        let mut record = Record::with_id("posts", ScalarValue::Integer(1));
        record.set("id", AttributeValue::Scalar(ScalarValue::Integer(1)));
        record.set("title", AttributeValue::Scalar(ScalarValue::Text("a".into())));
        session.seed_record(record);

        let statement = StatementBuilder::update("posts")
            .set("title", ScalarValue::Text("b".into()))
            .where_eq("id", ScalarValue::Integer(1))
            .build();
        assert_eq!(session.execute(&statement).unwrap(), 1);
        let record = session.record("posts", &ScalarValue::Integer(1)).unwrap();
        assert_eq!(
            record.read().get("title"),
            Some(&AttributeValue::Scalar(ScalarValue::Text("b".into())))
        );
    }

    #[test]
    fn stale_predicate_affects_zero_rows() {
        let mut session = MemorySession::new();
        let mut record = Record::with_id("posts", ScalarValue::Integer(1));
        record.set("id", AttributeValue::Scalar(ScalarValue::Integer(1)));
        record.set("version", AttributeValue::Scalar(ScalarValue::Integer(5)));
        session.seed_record(record);

        let statement = StatementBuilder::update("posts")
            .set("title", ScalarValue::Text("b".into()))
            .where_eq("id", ScalarValue::Integer(1))
            .where_eq("version", ScalarValue::Integer(4))
            .build();
        assert_eq!(session.execute(&statement).unwrap(), 0);
    }

    #[test]
    fn collection_rows_follow_index_predicates() {
        let mut session = MemorySession::new();
        for (index, value) in ["a", "b", "c"].iter().enumerate() {
            session.seed_collection_row(
                "posts",
                "comments",
                vec![
                    ("owner_id".to_string(), ScalarValue::Integer(1)),
                    ("element".to_string(), ScalarValue::Text((*value).into())),
                ],
                Some(index as i64),
            );
        }
        let statement = StatementBuilder::delete("posts")
            .collection("comments")
            .where_eq("owner_id", ScalarValue::Integer(1))
            .where_index_range(1, 3)
            .build();
        assert_eq!(session.execute(&statement).unwrap(), 2);
        assert_eq!(session.collection_rows("posts", "comments").len(), 1);
    }

    #[test]
    fn index_shift_renumbers_rows() {
        let mut session = MemorySession::new();
        session.seed_collection_row(
            "posts",
            "comments",
            vec![("owner_id".to_string(), ScalarValue::Integer(1))],
            Some(2),
        );
        let statement = StatementBuilder::update("posts")
            .collection("comments")
            .shift_index(-1)
            .where_eq("owner_id", ScalarValue::Integer(1))
            .where_index_range(1, i64::MAX)
            .build();
        assert_eq!(session.execute(&statement).unwrap(), 1);
        assert_eq!(session.collection_rows("posts", "comments")[0].index, Some(1));
    }

    #[test]
    fn persist_assigns_an_id() {
        let mut session = MemorySession::new();
        let record = Record::new("posts").wrap();
        session.persist(&record).unwrap();
        assert!(record.read().id().is_some());
    }

    #[test]
    fn delete_returning_hands_back_columns() {
        let mut session = MemorySession::new().with_returning_support();
        let mut record = Record::with_id("posts", ScalarValue::Integer(1));
        record.set("id", AttributeValue::Scalar(ScalarValue::Integer(1)));
        record.set(
            "attachment_id",
            AttributeValue::Scalar(ScalarValue::Integer(42)),
        );
        session.seed_record(record);

        let statement = StatementBuilder::delete("posts")
            .where_eq("id", ScalarValue::Integer(1))
            .returning(["attachment_id"])
            .build();
        let rows = session.execute_returning(&statement).unwrap();
        assert_eq!(rows, vec![vec![ScalarValue::Integer(42)]]);
        assert!(session.record("posts", &ScalarValue::Integer(1)).is_none());
    }
}
