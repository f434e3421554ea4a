//! Subview reference flusher.

use crate::context::{FlushContext, PostFlushAction};
use crate::descriptor::TypeDescriptor;
use crate::error::{FlushError, FlushResult};
use crate::flusher::flush_nested_view;
use crate::inverse::InverseFlusher;
use crate::mapping::AttributeMapping;
use crate::session::Statement;
use crate::statement::StatementBuilder;
use deltaview_model::{
    AttributeAccessor, AttributeValue, DirtyKind, RecordRef, ScalarValue, ViewRef,
};
use std::sync::Arc;

/// Flusher for a reference to another view.
///
/// Three execution branches apply, depending on whether the attribute is
/// updatable, whether the reference identity changed versus only nested
/// content, and whether the foreign key lives on the other side.
#[derive(Debug, Clone)]
pub struct SubviewAttributeFlusher {
    name: String,
    accessor: AttributeAccessor,
    descriptor: TypeDescriptor,
    updatable: bool,
    optimistic_lock_protected: bool,
    orphan_removal: bool,
    inverse: Option<InverseFlusher>,
    fetches: Vec<String>,
    /// Dirty-instance state: the value the attribute held at load time.
    previous: Option<AttributeValue>,
    /// Dirty-instance state: whether the reference identity changed.
    identity_changed: bool,
}

impl SubviewAttributeFlusher {
    /// Builds the flusher from an attribute mapping.
    pub fn new(mapping: &AttributeMapping) -> FlushResult<Self> {
        if mapping.descriptor.mapping().is_none() {
            return Err(FlushError::configuration(format!(
                "attribute {}: subview attribute needs a subview descriptor",
                mapping.name
            )));
        }
        Ok(Self {
            name: mapping.name.clone(),
            accessor: AttributeAccessor::new(mapping.slot, mapping.column.clone()),
            descriptor: mapping.descriptor.clone(),
            updatable: mapping.updatable,
            optimistic_lock_protected: mapping.optimistic_lock_protected,
            orphan_removal: mapping.orphan_removal,
            inverse: mapping.inverse.as_ref().map(InverseFlusher::from_mapping),
            fetches: mapping.fetches.clone(),
            previous: None,
            identity_changed: false,
        })
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

    /// Returns the nested fetch paths.
    #[must_use]
    pub fn fetches(&self) -> &[String] {
        &self.fetches
    }

    fn referenced_id(value: &AttributeValue) -> Option<ScalarValue> {
        value.as_view().and_then(|view| view.read().id().cloned())
    }

    /// Classifies the change between initial and current reference.
    #[must_use]
    pub fn dirty_kind(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> DirtyKind {
        let initial_view = initial.and_then(AttributeValue::as_view);
        let current_view = current.as_view();
        match (initial_view, current_view) {
            (None, None) => DirtyKind::None,
            (None, Some(_)) | (Some(_), None) => DirtyKind::Updated,
            (Some(before), Some(after)) => {
                if Arc::ptr_eq(before, after) {
                    if after.read().is_any_dirty() {
                        DirtyKind::Mutated
                    } else {
                        DirtyKind::None
                    }
                } else {
                    let before_id = before.read().id().cloned();
                    let after_id = after.read().id().cloned();
                    match (before_id, after_id) {
                        (Some(a), Some(b)) if a == b => DirtyKind::Mutated,
                        _ => DirtyKind::Updated,
                    }
                }
            }
        }
    }

    /// Returns a flusher scoped to the diff, or `None`.
    #[must_use]
    pub fn dirty_flusher(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> Option<SubviewAttributeFlusher> {
        let kind = self.dirty_kind(initial, current);
        if kind == DirtyKind::None {
            return None;
        }
        if kind == DirtyKind::Updated && !self.updatable {
            // The reference cannot be rewritten; only nested mutations flow.
            return None;
        }
        let mut dirty = self.clone();
        dirty.previous = initial.cloned();
        dirty.identity_changed = kind == DirtyKind::Updated;
        Some(dirty)
    }

    /// Persists a new referenced view when persist cascading applies.
    fn cascade_persist_if_new(
        &self,
        ctx: &mut FlushContext<'_>,
        current: &AttributeValue,
    ) -> FlushResult<()> {
        if let Some(child) = current.as_view() {
            if child.read().is_new() && self.descriptor.should_cascade_persist() {
                flush_nested_view(ctx, &self.descriptor, child)?;
            }
        }
        Ok(())
    }

    fn schedule_orphan_removal(&self, ctx: &mut FlushContext<'_>) {
        if !self.orphan_removal {
            return;
        }
        let Some(previous) = self.previous.as_ref().and_then(AttributeValue::as_view) else {
            return;
        };
        let Some(mapping) = self.descriptor.mapping() else {
            return;
        };
        // The delete of the previously referenced object runs only once the
        // new reference is safely written.
        ctx.enqueue_post_flush(PostFlushAction::DeleteView {
            mapping: Arc::clone(mapping),
            view: Arc::clone(previous),
        });
    }

    /// Statement-based flush.
    pub fn flush_query(
        &self,
        ctx: &mut FlushContext<'_>,
        view: &ViewRef,
        owner_update: Option<&mut Statement>,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        if self.identity_changed {
            self.cascade_persist_if_new(ctx, current)?;
            let new_id = Self::referenced_id(current);
            if let Some(inverse) = &self.inverse {
                // The foreign key lives on the child row: detach the old
                // child, point the new one at the owner.
                let owner_id = view.read().id().cloned().ok_or_else(|| {
                    FlushError::unsupported(format!(
                        "attribute {}: inverse flush requires an owner id",
                        self.name
                    ))
                })?;
                if let Some(previous_id) = self
                    .previous
                    .as_ref()
                    .and_then(Self::referenced_id)
                {
                    inverse.remove_element(ctx, &previous_id, None)?;
                }
                if let Some(new_id) = &new_id {
                    inverse.flush_query_set_owner(ctx, new_id, Some(&owner_id))?;
                }
            } else {
                let statement = owner_update.ok_or_else(|| {
                    FlushError::unsupported(format!(
                        "attribute {}: reference update requires an owner statement",
                        self.name
                    ))
                })?;
                statement.assignments.push((
                    self.accessor.column().to_string(),
                    new_id.unwrap_or(ScalarValue::Null),
                ));
            }
            self.schedule_orphan_removal(ctx);
            Ok(true)
        } else {
            // Same identity, nested content changed: cascade into the
            // referenced view's own flush.
            if !self.descriptor.should_cascade_update() {
                return Ok(false);
            }
            match current.as_view() {
                Some(child) => flush_nested_view(ctx, &self.descriptor, child),
                None => Ok(false),
            }
        }
    }

    /// Managed-record flush.
    pub fn flush_record(
        &self,
        ctx: &mut FlushContext<'_>,
        record: &RecordRef,
        _view: &ViewRef,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        if self.identity_changed {
            self.cascade_persist_if_new(ctx, current)?;
            let new_id = Self::referenced_id(current).unwrap_or(ScalarValue::Null);
            let changed = self
                .accessor
                .set_record(&mut record.write(), AttributeValue::Scalar(new_id));
            self.schedule_orphan_removal(ctx);
            Ok(changed)
        } else {
            if !self.descriptor.should_cascade_update() {
                return Ok(false);
            }
            match current.as_view() {
                Some(child) => flush_nested_view(ctx, &self.descriptor, child),
                None => Ok(false),
            }
        }
    }

    /// Cascade-delete hook for the owning-row delete.
    pub fn remove(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
        current: &AttributeValue,
    ) -> FlushResult<()> {
        if let Some(inverse) = &self.inverse {
            // Children referencing the owner must be detached first.
            return inverse.remove_by_owner_id(ctx, owner_id);
        }
        if self.orphan_removal {
            if let (Some(entity), Some(child_id)) =
                (self.descriptor.entity(), Self::referenced_id(current))
            {
                let statement = StatementBuilder::delete(entity)
                    .where_eq("id", child_id)
                    .build();
                ctx.session().execute(&statement)?;
            }
        }
        Ok(())
    }

    /// The owner row references the child, so a cascaded child delete must
    /// run after the owner row is gone; with an inverse mapping the child
    /// references the owner and must be handled before.
    #[must_use]
    pub fn requires_delete_cascade_after_remove(&self) -> bool {
        self.inverse.is_none()
    }

    /// Returns whether changes bump the optimistic-lock version.
    #[must_use]
    pub fn is_optimistic_lock_protected(&self) -> bool {
        self.optimistic_lock_protected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ViewTypeMapping;
    use deltaview_model::ViewObject;

    fn child_mapping() -> Arc<ViewTypeMapping> {
        Arc::new(
            ViewTypeMapping::new("AuthorView", "authors")
                .with_id(0, "id")
                .with_attribute(AttributeMapping::basic("id", 0, "id").read_only())
                .with_attribute(AttributeMapping::basic("name", 1, "name")),
        )
    }

    fn child(id: i64) -> ViewRef {
        ViewObject::loaded(
            "AuthorView",
            ScalarValue::Integer(id),
            vec![
                AttributeValue::Scalar(ScalarValue::Integer(id)),
                AttributeValue::Scalar(ScalarValue::Text("a".into())),
            ],
        )
        .unwrap()
        .wrap()
    }

    fn flusher() -> SubviewAttributeFlusher {
        SubviewAttributeFlusher::new(&AttributeMapping::subview(
            "author",
            1,
            "author_id",
            child_mapping(),
        ))
        .unwrap()
    }

    #[test]
    fn same_reference_without_changes_is_clean() {
        let f = flusher();
        let c = child(1);
        let value = AttributeValue::View(c);
        assert_eq!(f.dirty_kind(Some(&value), &value), DirtyKind::None);
    }

    #[test]
    fn same_reference_with_nested_changes_is_mutated() {
        let f = flusher();
        let c = child(1);
        c.write()
            .set(1, AttributeValue::Scalar(ScalarValue::Text("b".into())))
            .unwrap();
        let value = AttributeValue::View(c);
        assert_eq!(f.dirty_kind(Some(&value), &value), DirtyKind::Mutated);
    }

    #[test]
    fn different_reference_is_updated() {
        let f = flusher();
        let before = AttributeValue::View(child(1));
        let after = AttributeValue::View(child(2));
        assert_eq!(f.dirty_kind(Some(&before), &after), DirtyKind::Updated);
    }

    #[test]
    fn different_instance_same_id_is_mutated() {
        let f = flusher();
        let before = AttributeValue::View(child(1));
        let after = AttributeValue::View(child(1));
        assert_eq!(f.dirty_kind(Some(&before), &after), DirtyKind::Mutated);
    }

    #[test]
    fn null_transition_is_updated() {
        let f = flusher();
        let value = AttributeValue::View(child(1));
        assert_eq!(
            f.dirty_kind(Some(&AttributeValue::null()), &value),
            DirtyKind::Updated
        );
        assert_eq!(
            f.dirty_kind(Some(&value), &AttributeValue::null()),
            DirtyKind::Updated
        );
    }

    #[test]
    fn dirty_flusher_captures_previous_value() {
        let f = flusher();
        let before = AttributeValue::View(child(1));
        let after = AttributeValue::View(child(2));
        let dirty = f.dirty_flusher(Some(&before), &after).unwrap();
        assert!(dirty.identity_changed);
        assert!(dirty.previous.is_some());
    }
}
