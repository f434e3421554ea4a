//! Attribute accessors.
//!
//! An accessor pairs a view slot index with a record column name, giving the
//! flush engine one object through which to read and write an attribute on
//! either side. Accessor tables are built at view-type registration time.

use crate::error::ModelResult;
use crate::record::Record;
use crate::view::{AttributeValue, ViewObject};

/// Read/write access to one attribute on a view object or a managed record.
#[derive(Debug, Clone)]
pub struct AttributeAccessor {
    slot: usize,
    column: String,
}

impl AttributeAccessor {
    /// Creates an accessor for `slot` on the view side and `column` on the
    /// record side.
    #[must_use]
    pub fn new(slot: usize, column: impl Into<String>) -> Self {
        Self {
            slot,
            column: column.into(),
        }
    }

    /// Returns the view slot index.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Returns the record column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Reads the attribute from a view object.
    pub fn get_view(&self, view: &ViewObject) -> ModelResult<AttributeValue> {
        view.get(self.slot).cloned()
    }

    /// Reads the attribute's initial value from a view object, if a snapshot
    /// exists.
    #[must_use]
    pub fn get_view_initial(&self, view: &ViewObject) -> Option<AttributeValue> {
        view.initial(self.slot).cloned()
    }

    /// Writes the attribute on a view object, flipping its dirty bit.
    pub fn set_view(&self, view: &mut ViewObject, value: AttributeValue) -> ModelResult<()> {
        view.set(self.slot, value)
    }

    /// Writes the attribute on a view object without flipping its dirty bit.
    pub fn set_view_untracked(
        &self,
        view: &mut ViewObject,
        value: AttributeValue,
    ) -> ModelResult<()> {
        view.set_untracked(self.slot, value)
    }

    /// Reads the attribute from a managed record.
    #[must_use]
    pub fn get_record(&self, record: &Record) -> Option<AttributeValue> {
        record.get(&self.column).cloned()
    }

    /// Writes the attribute on a managed record.
    ///
    /// Returns `true` if the stored value actually changed.
    pub fn set_record(&self, record: &mut Record, value: AttributeValue) -> bool {
        record.set(self.column.clone(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarValue;

    #[test]
    fn view_roundtrip() {
        let mut view = ViewObject::new_transient(
            "test",
            vec![AttributeValue::Scalar(ScalarValue::Null)],
        )
        .unwrap();
        let accessor = AttributeAccessor::new(0, "name");
        accessor
            .set_view(&mut view, AttributeValue::Scalar(ScalarValue::Text("x".into())))
            .unwrap();
        assert_eq!(
            accessor.get_view(&view).unwrap(),
            AttributeValue::Scalar(ScalarValue::Text("x".into()))
        );
        assert!(view.is_dirty(0));
    }

    #[test]
    fn record_roundtrip() {
        let mut record = Record::new("users");
        let accessor = AttributeAccessor::new(0, "name");
        assert!(accessor.set_record(
            &mut record,
            AttributeValue::Scalar(ScalarValue::Text("x".into()))
        ));
        assert_eq!(
            accessor.get_record(&record),
            Some(AttributeValue::Scalar(ScalarValue::Text("x".into())))
        );
    }
}
