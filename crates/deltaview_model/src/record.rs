//! Managed store-side records.

use crate::value::ScalarValue;
use crate::view::AttributeValue;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to a managed record.
pub type RecordRef = Arc<RwLock<Record>>;

/// A store-managed object corresponding to one row.
///
/// Records are attached to a store session; mutating an attached record is
/// the managed-object flush path — the store's own change detection emits
/// the statements.
#[derive(Debug, Clone)]
pub struct Record {
    entity: String,
    id: Option<ScalarValue>,
    fields: BTreeMap<String, AttributeValue>,
}

impl Record {
    /// Creates a new, unattached record with no id.
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Creates a record with an id.
    #[must_use]
    pub fn with_id(entity: impl Into<String>, id: ScalarValue) -> Self {
        Self {
            entity: entity.into(),
            id: Some(id),
            fields: BTreeMap::new(),
        }
    }

    /// Returns the entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the record's id, if assigned.
    #[must_use]
    pub fn id(&self) -> Option<&ScalarValue> {
        self.id.as_ref()
    }

    /// Assigns the record's id.
    pub fn set_id(&mut self, id: ScalarValue) {
        self.id = Some(id);
    }

    /// Returns the value of a named field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&AttributeValue> {
        self.fields.get(field)
    }

    /// Sets a named field.
    ///
    /// Returns `true` if the stored value actually changed, which drives
    /// optimistic-lock version bump decisions.
    pub fn set(&mut self, field: impl Into<String>, value: AttributeValue) -> bool {
        let field = field.into();
        match self.fields.get(&field) {
            Some(existing) if existing.identity_eq(&value) => false,
            _ => {
                self.fields.insert(field, value);
                true
            }
        }
    }

    /// Removes a named field, returning its previous value.
    pub fn unset(&mut self, field: &str) -> Option<AttributeValue> {
        self.fields.remove(field)
    }

    /// Returns the field map.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, AttributeValue> {
        &self.fields
    }

    /// Wraps the record in a shared handle.
    #[must_use]
    pub fn wrap(self) -> RecordRef {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_change() {
        let mut record = Record::new("users");
        assert!(record.set("name", AttributeValue::Scalar(ScalarValue::Text("a".into()))));
        assert!(!record.set("name", AttributeValue::Scalar(ScalarValue::Text("a".into()))));
        assert!(record.set("name", AttributeValue::Scalar(ScalarValue::Text("b".into()))));
    }

    #[test]
    fn id_assignment() {
        let mut record = Record::new("users");
        assert!(record.id().is_none());
        record.set_id(ScalarValue::Integer(7));
        assert_eq!(record.id(), Some(&ScalarValue::Integer(7)));
    }

    #[test]
    fn unset_returns_previous() {
        let mut record = Record::new("users");
        record.set("age", AttributeValue::Scalar(ScalarValue::Integer(3)));
        let old = record.unset("age");
        assert_eq!(old, Some(AttributeValue::Scalar(ScalarValue::Integer(3))));
        assert!(record.get("age").is_none());
    }
}
