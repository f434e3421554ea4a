//! Optimistic-lock version flusher.

use crate::error::{FlushError, FlushResult};
use crate::mapping::AttributeMapping;
use crate::session::{Predicate, Statement};
use deltaview_model::{AttributeAccessor, AttributeValue, RecordRef, ScalarValue, ViewRef};

/// Flusher for the optimistic-lock version column.
///
/// On every flush it computes the next value through a monotonic codec,
/// asserts the in-memory version still matches the stored one, and writes
/// the bumped value back into the view. It executes last among attribute
/// fragments and is skipped when nothing else changed.
#[derive(Debug, Clone)]
pub struct VersionAttributeFlusher {
    name: String,
    accessor: AttributeAccessor,
}

impl VersionAttributeFlusher {
    /// Builds the flusher from the version attribute mapping.
    #[must_use]
    pub fn new(mapping: &AttributeMapping) -> Self {
        Self {
            name: mapping.name.clone(),
            accessor: AttributeAccessor::new(mapping.slot, mapping.column.clone()),
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

    /// Returns the version column.
    #[must_use]
    pub fn column(&self) -> &str {
        self.accessor.column()
    }

    /// The monotonic version codec. Only integer versions are supported;
    /// the shape is validated at registration time.
    pub fn next_value(current: &ScalarValue) -> FlushResult<ScalarValue> {
        match current {
            ScalarValue::Null => Ok(ScalarValue::Integer(1)),
            ScalarValue::Integer(version) => Ok(ScalarValue::Integer(version + 1)),
            other => Err(FlushError::configuration(format!(
                "version values must be integers, got {}",
                other.kind_name()
            ))),
        }
    }

    /// The initial version written when a view is first persisted.
    #[must_use]
    pub fn initial_value() -> ScalarValue {
        ScalarValue::Integer(1)
    }

    fn current_version(&self, view: &ViewRef) -> FlushResult<ScalarValue> {
        let guard = view.read();
        let value = self.accessor.get_view(&guard)?;
        match value {
            AttributeValue::Scalar(scalar) => Ok(scalar),
            other => Err(FlushError::configuration(format!(
                "version attribute {} holds a non-scalar value of kind {}",
                self.name,
                other.kind_name()
            ))),
        }
    }

    /// Appends the version bump and guard predicate to the owner update.
    ///
    /// Returns the bumped value; the caller writes it back into the view
    /// once the statement executed.
    pub fn flush_query(
        &self,
        view: &ViewRef,
        statement: &mut Statement,
    ) -> FlushResult<ScalarValue> {
        let current = self.current_version(view)?;
        let next = Self::next_value(&current)?;
        statement
            .assignments
            .push((self.accessor.column().to_string(), next.clone()));
        statement.predicates.push(Predicate::Eq {
            path: self.accessor.column().to_string(),
            value: current,
        });
        Ok(next)
    }

    /// Bumps the version on the managed record.
    ///
    /// Asserts that the record's stored version matches the view's
    /// in-memory version; a disagreement is an optimistic-lock failure.
    pub fn flush_record(&self, record: &RecordRef, view: &ViewRef) -> FlushResult<bool> {
        let in_memory = self.current_version(view)?;
        {
            let guard = record.read();
            if let Some(AttributeValue::Scalar(stored)) = self.accessor.get_record(&guard) {
                if stored != in_memory {
                    return Err(FlushError::optimistic_lock(
                        guard.entity(),
                        format!(
                            "version mismatch: view holds {in_memory}, record holds {stored}"
                        ),
                    ));
                }
            }
        }
        let next = Self::next_value(&in_memory)?;
        record.write().set(
            self.accessor.column().to_string(),
            AttributeValue::Scalar(next.clone()),
        );
        self.write_back(view, next)?;
        Ok(true)
    }

    /// Writes the bumped version back into the view without flipping its
    /// dirty bit.
    pub fn write_back(&self, view: &ViewRef, next: ScalarValue) -> FlushResult<()> {
        self.accessor
            .set_view_untracked(&mut view.write(), AttributeValue::Scalar(next))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StatementKind;
    use deltaview_model::{Record, ViewObject};

    fn version_view(version: i64) -> ViewRef {
        ViewObject::loaded(
            "PostView",
            ScalarValue::Integer(1),
            vec![AttributeValue::Scalar(ScalarValue::Integer(version))],
        )
        .unwrap()
        .wrap()
    }

    fn flusher() -> VersionAttributeFlusher {
        VersionAttributeFlusher::new(&AttributeMapping::version("version", 0, "version"))
    }

    #[test]
    fn next_value_is_monotonic() {
        let next = VersionAttributeFlusher::next_value(&ScalarValue::Integer(4)).unwrap();
        assert_eq!(next, ScalarValue::Integer(5));
        assert!(matches!(
            VersionAttributeFlusher::next_value(&ScalarValue::Null),
            Ok(ScalarValue::Integer(1))
        ));
    }

    #[test]
    fn non_integer_version_is_a_configuration_error() {
        let result = VersionAttributeFlusher::next_value(&ScalarValue::Text("v1".into()));
        assert!(matches!(result, Err(FlushError::Configuration { .. })));
    }

    #[test]
    fn flush_query_appends_bump_and_guard() {
        let view = version_view(3);
        let mut statement = Statement::new(StatementKind::Update, "posts");
        let next = flusher().flush_query(&view, &mut statement).unwrap();
        assert_eq!(next, ScalarValue::Integer(4));
        assert_eq!(
            statement.assignments,
            vec![("version".to_string(), ScalarValue::Integer(4))]
        );
        assert_eq!(
            statement.predicates,
            vec![Predicate::Eq {
                path: "version".into(),
                value: ScalarValue::Integer(3)
            }]
        );
    }

    #[test]
    fn flush_record_detects_stored_mismatch() {
        let view = version_view(3);
        let record = Record::with_id("posts", ScalarValue::Integer(1)).wrap();
        record.write().set(
            "version",
            AttributeValue::Scalar(ScalarValue::Integer(7)),
        );
        let result = flusher().flush_record(&record, &view);
        assert!(matches!(result, Err(FlushError::OptimisticLock { .. })));
    }

    #[test]
    fn flush_record_bumps_and_writes_back() {
        let view = version_view(3);
        let record = Record::with_id("posts", ScalarValue::Integer(1)).wrap();
        record.write().set(
            "version",
            AttributeValue::Scalar(ScalarValue::Integer(3)),
        );
        assert!(flusher().flush_record(&record, &view).unwrap());
        assert_eq!(
            record.read().get("version"),
            Some(&AttributeValue::Scalar(ScalarValue::Integer(4)))
        );
        assert_eq!(
            view.read().get(0).unwrap(),
            &AttributeValue::Scalar(ScalarValue::Integer(4))
        );
        assert!(!view.read().is_any_dirty());
    }
}
