//! Basic scalar attribute flusher.

use crate::descriptor::TypeDescriptor;
use crate::error::{FlushError, FlushResult};
use crate::fetch_graph::FetchGraphNode;
use crate::mapping::AttributeMapping;
use crate::session::Statement;
use deltaview_model::{AttributeAccessor, AttributeValue, DirtyKind, RecordRef};

/// Flusher for a basic scalar column: direct value copy / parameter bind.
#[derive(Debug, Clone)]
pub struct BasicAttributeFlusher {
    name: String,
    accessor: AttributeAccessor,
    descriptor: TypeDescriptor,
    updatable: bool,
    optimistic_lock_protected: bool,
}

impl BasicAttributeFlusher {
    /// Builds the flusher from an attribute mapping.
    #[must_use]
    pub fn new(mapping: &AttributeMapping) -> Self {
        Self {
            name: mapping.name.clone(),
            accessor: AttributeAccessor::new(mapping.slot, mapping.column.clone()),
            descriptor: mapping.descriptor.clone(),
            updatable: mapping.updatable,
            optimistic_lock_protected: mapping.optimistic_lock_protected,
        }
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the view slot.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.accessor.slot()
    }

    /// Classifies the change. Basic scalars only ever report
    /// [`DirtyKind::None`] or [`DirtyKind::Updated`], except for mutable
    /// values without dirty-check support, which must be assumed mutated.
    #[must_use]
    pub fn dirty_kind(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> DirtyKind {
        match initial {
            Some(initial) if initial.identity_eq(current) => {
                if self.descriptor.is_mutable() && !self.descriptor.supports_dirty_check() {
                    DirtyKind::Mutated
                } else {
                    DirtyKind::None
                }
            }
            _ => DirtyKind::Updated,
        }
    }

    /// Returns a flusher scoped to the diff, or `None`.
    #[must_use]
    pub fn dirty_flusher(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> Option<BasicAttributeFlusher> {
        if !self.updatable {
            return None;
        }
        match self.dirty_kind(initial, current) {
            DirtyKind::None => None,
            _ => Some(self.clone()),
        }
    }

    /// Binds the value into the owner update statement.
    pub fn flush_query(
        &self,
        owner_update: Option<&mut Statement>,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        let scalar = current.as_scalar().ok_or_else(|| {
            FlushError::unsupported(format!(
                "basic attribute {} holds a non-scalar value",
                self.name
            ))
        })?;
        let statement = owner_update.ok_or_else(|| {
            FlushError::unsupported(format!(
                "basic attribute {} requires an owner update statement",
                self.name
            ))
        })?;
        statement
            .assignments
            .push((self.accessor.column().to_string(), scalar.clone()));
        Ok(true)
    }

    /// Writes the value onto the managed record.
    pub fn flush_record(
        &self,
        record: &RecordRef,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        Ok(self.accessor.set_record(&mut record.write(), current.clone()))
    }

    /// Returns whether changes bump the optimistic-lock version.
    #[must_use]
    pub fn is_optimistic_lock_protected(&self) -> bool {
        self.optimistic_lock_protected
    }

    /// Returns whether the attribute never produces statements.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        !self.updatable
    }

    /// Basic columns need no fetch graph.
    #[must_use]
    pub fn fetch_graph(&self) -> Option<FetchGraphNode> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltaview_model::{Record, ScalarValue};

    fn flusher() -> BasicAttributeFlusher {
        BasicAttributeFlusher::new(&AttributeMapping::basic("title", 0, "title"))
    }

    fn text(s: &str) -> AttributeValue {
        AttributeValue::Scalar(ScalarValue::Text(s.into()))
    }

    #[test]
    fn unchanged_value_is_clean() {
        let f = flusher();
        assert_eq!(f.dirty_kind(Some(&text("a")), &text("a")), DirtyKind::None);
        assert!(f.dirty_flusher(Some(&text("a")), &text("a")).is_none());
    }

    #[test]
    fn changed_value_is_updated() {
        let f = flusher();
        assert_eq!(
            f.dirty_kind(Some(&text("a")), &text("b")),
            DirtyKind::Updated
        );
        assert!(f.dirty_flusher(Some(&text("a")), &text("b")).is_some());
    }

    #[test]
    fn mutable_without_dirty_check_is_assumed_mutated() {
        let mut mapping = AttributeMapping::basic("blob", 0, "blob");
        mapping.descriptor = TypeDescriptor::mutable_basic(false);
        let f = BasicAttributeFlusher::new(&mapping);
        assert_eq!(
            f.dirty_kind(Some(&text("a")), &text("a")),
            DirtyKind::Mutated
        );
    }

    #[test]
    fn read_only_attribute_never_flushes() {
        let f = BasicAttributeFlusher::new(&AttributeMapping::basic("id", 0, "id").read_only());
        assert!(f.dirty_flusher(Some(&text("a")), &text("b")).is_none());
        assert!(f.is_passthrough());
    }

    #[test]
    fn flush_query_binds_the_column() {
        let f = flusher();
        let mut statement = Statement::new(crate::session::StatementKind::Update, "posts");
        let flushed = f.flush_query(Some(&mut statement), &text("x")).unwrap();
        assert!(flushed);
        assert_eq!(
            statement.assignments,
            vec![("title".to_string(), ScalarValue::Text("x".into()))]
        );
    }

    #[test]
    fn flush_record_reports_change() {
        let f = flusher();
        let record = Record::new("posts").wrap();
        assert!(f.flush_record(&record, &text("x")).unwrap());
        assert!(!f.flush_record(&record, &text("x")).unwrap());
    }

    #[test]
    fn non_scalar_value_is_rejected() {
        let f = flusher();
        let list = AttributeValue::List(deltaview_model::RecordingList::new());
        let mut statement = Statement::new(crate::session::StatementKind::Update, "posts");
        assert!(f.flush_query(Some(&mut statement), &list).is_err());
    }
}
