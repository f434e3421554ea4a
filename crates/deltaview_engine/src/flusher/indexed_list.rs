//! Indexed-list flusher.

use crate::context::FlushContext;
use crate::descriptor::TypeDescriptor;
use crate::error::{FlushError, FlushResult};
use crate::flusher::{element_is_dirty, element_store_value, flush_nested_view};
use crate::fused::FusedCollectionIndexActions;
use crate::inverse::InverseFlusher;
use crate::mapping::AttributeMapping;
use crate::statement::StatementBuilder;
use deltaview_model::{
    AttributeValue, DirtyKind, RecordRef, RecordingList, ScalarValue, ViewRef,
};
use tracing::trace;

/// Flusher for an ordered collection with a positional index column.
///
/// Structural changes are compressed through the index-translation folding
/// and issued as range removes, batch renumberings, positional replaces,
/// and appends.
#[derive(Debug, Clone)]
pub struct IndexedListAttributeFlusher {
    name: String,
    slot: usize,
    path: String,
    element: TypeDescriptor,
    owner_entity: String,
    owner_column: String,
    element_column: String,
    index_column: String,
    updatable: bool,
    optimistic_lock_protected: bool,
    orphan_removal: bool,
    inverse: Option<InverseFlusher>,
    fetches: Vec<String>,
    /// Dirty-instance state: the element content at load time.
    initial_elements: Option<Vec<AttributeValue>>,
}

impl IndexedListAttributeFlusher {
    /// Builds the flusher from an attribute mapping and its owning entity.
    #[must_use]
    pub fn new(mapping: &AttributeMapping, owner_entity: &str) -> Self {
        Self {
            name: mapping.name.clone(),
            slot: mapping.slot,
            path: mapping.column.clone(),
            element: mapping.descriptor.clone(),
            owner_entity: owner_entity.to_string(),
            owner_column: mapping.owner_column.clone(),
            element_column: mapping.element_column.clone(),
            index_column: mapping.index_column.clone(),
            updatable: mapping.updatable,
            optimistic_lock_protected: mapping.optimistic_lock_protected,
            orphan_removal: mapping.orphan_removal,
            inverse: mapping.inverse.as_ref().map(InverseFlusher::from_mapping),
            fetches: mapping.fetches.clone(),
            initial_elements: None,
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
        self.slot
    }

    /// Returns the nested fetch paths.
    #[must_use]
    pub fn fetches(&self) -> &[String] {
        &self.fetches
    }

    /// Returns whether the list can be flushed with statements.
    #[must_use]
    pub fn supports_query_flush(&self) -> bool {
        true
    }

    /// Classifies the change between initial and current content, in order.
    #[must_use]
    pub fn dirty_kind(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> DirtyKind {
        let initial_list = initial.and_then(AttributeValue::as_list);
        let current_list = current.as_list();
        let (initial_list, current_list) = match (initial_list, current_list) {
            (None, None) => return DirtyKind::None,
            (None, Some(_)) | (Some(_), None) => return DirtyKind::Updated,
            (Some(a), Some(b)) => (a, b),
        };
        if current_list.has_actions() {
            return DirtyKind::Mutated;
        }
        if initial_list.len() != current_list.len() {
            return DirtyKind::Mutated;
        }
        if self.element.should_flush_mutations() {
            if self.element.supports_dirty_check() {
                for (before, after) in initial_list.iter().zip(current_list.iter()) {
                    if !before.identity_eq(after) || element_is_dirty(after) {
                        return DirtyKind::Mutated;
                    }
                }
            } else if self.element.supports_deep_equality() {
                if !list_equals(initial_list, current_list) {
                    return DirtyKind::Mutated;
                }
            } else {
                // Without dirty checking, dirtiness must be assumed.
                return DirtyKind::Mutated;
            }
        } else if !list_equals(initial_list, current_list) {
            return DirtyKind::Mutated;
        }
        DirtyKind::None
    }

    /// Returns a flusher scoped to the diff, or `None`.
    #[must_use]
    pub fn dirty_flusher(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> Option<IndexedListAttributeFlusher> {
        if !self.updatable && !self.element.should_flush_mutations() {
            return None;
        }
        if self.dirty_kind(initial, current) == DirtyKind::None {
            return None;
        }
        let mut dirty = self.clone();
        dirty.initial_elements = initial
            .and_then(AttributeValue::as_list)
            .map(|list| list.elements().to_vec());
        Some(dirty)
    }

    fn owner_id(&self, view: &ViewRef) -> FlushResult<ScalarValue> {
        view.read().id().cloned().ok_or_else(|| {
            FlushError::unsupported(format!(
                "attribute {}: flushing an indexed list requires an owner id",
                self.name
            ))
        })
    }

    fn cascade_elements<'a>(
        &self,
        ctx: &mut FlushContext<'_>,
        elements: impl Iterator<Item = &'a AttributeValue>,
    ) -> FlushResult<bool> {
        let mut changed = false;
        for element in elements {
            let Some(child) = element.as_view() else { continue };
            let (is_new, is_dirty) = {
                let guard = child.read();
                (guard.is_new(), guard.is_any_dirty())
            };
            if is_new && self.element.should_cascade_persist()
                || is_dirty && self.element.should_cascade_update()
            {
                changed |= flush_nested_view(ctx, &self.element, child)?;
            }
        }
        Ok(changed)
    }

    fn insert_at(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
        position: i64,
        element: &AttributeValue,
    ) -> FlushResult<()> {
        let stored = element_store_value(element)?;
        let statement = StatementBuilder::insert(&self.owner_entity)
            .collection(&self.path)
            .set(&self.owner_column, owner_id.clone())
            .set(&self.element_column, stored)
            .at_position(position)
            .build();
        ctx.session().execute(&statement)?;
        Ok(())
    }

    fn delete_all_rows(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
    ) -> FlushResult<()> {
        let statement = StatementBuilder::delete(&self.owner_entity)
            .collection(&self.path)
            .where_eq(&self.owner_column, owner_id.clone())
            .build();
        ctx.session().execute(&statement)?;
        Ok(())
    }

    fn content_differs(&self, current: &RecordingList) -> bool {
        match &self.initial_elements {
            Some(initial) => {
                initial.len() != current.len()
                    || initial
                        .iter()
                        .zip(current.iter())
                        .any(|(a, b)| !a.identity_eq(b))
            }
            None => true,
        }
    }

    fn flush_fused(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
        fused: &FusedCollectionIndexActions,
    ) -> FlushResult<()> {
        for range in fused.remove_ranges() {
            let statement = StatementBuilder::delete(&self.owner_entity)
                .collection(&self.path)
                .where_eq(&self.owner_column, owner_id.clone())
                .where_index_range(range.start, range.end)
                .build();
            ctx.session().execute(&statement)?;
            if self.orphan_removal && self.element.is_subview() {
                if let Some(entity) = self.element.entity() {
                    for element in range.removed() {
                        let stored = element_store_value(element)?;
                        let child_delete = StatementBuilder::delete(entity)
                            .where_eq("id", stored)
                            .build();
                        ctx.session().execute(&child_delete)?;
                    }
                }
            }
        }
        for translation in fused.translations() {
            // The interval end is inclusive with an unbounded sentinel;
            // range predicates take an exclusive end.
            let end = if translation.end == i64::MAX {
                i64::MAX
            } else {
                translation.end + 1
            };
            let statement = StatementBuilder::update(&self.owner_entity)
                .collection(&self.path)
                .shift_index(translation.offset)
                .where_eq(&self.owner_column, owner_id.clone())
                .where_index_range(translation.start, end)
                .build();
            ctx.session().execute(&statement)?;
        }
        for replace in fused.replaces() {
            if replace.old_value().is_some() {
                let stored = element_store_value(replace.new_value())?;
                let statement = StatementBuilder::update(&self.owner_entity)
                    .collection(&self.path)
                    .set(&self.element_column, stored)
                    .where_eq(&self.owner_column, owner_id.clone())
                    .where_index(replace.index)
                    .build();
                ctx.session().execute(&statement)?;
            } else {
                self.insert_at(ctx, owner_id, replace.index, replace.new_value())?;
            }
        }
        if let Some(append_index) = fused.append_index() {
            for (offset, element) in fused.appended().iter().enumerate() {
                self.insert_at(ctx, owner_id, append_index + offset as i64, element)?;
            }
        }
        Ok(())
    }

    /// Statement-based flush.
    pub fn flush_query(
        &self,
        ctx: &mut FlushContext<'_>,
        view: &ViewRef,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        let owner_id = self.owner_id(view)?;
        if current.is_null() {
            self.delete_all_rows(ctx, &owner_id)?;
            return Ok(true);
        }
        let list = current.as_list().ok_or_else(|| {
            FlushError::unsupported(format!(
                "attribute {} holds a non-list value",
                self.name
            ))
        })?;
        let mut changed = self.cascade_elements(ctx, list.iter())?;
        if list.has_actions() {
            let fused = FusedCollectionIndexActions::new(list.actions(), &element_is_dirty);
            trace!(
                attribute = %self.name,
                removes = fused.remove_count(),
                adds = fused.add_count(),
                updates = fused.update_count(),
                "fused indexed list actions"
            );
            self.flush_fused(ctx, &owner_id, &fused)?;
            changed |= !fused.is_empty();
        } else if self.content_differs(list) {
            // The container was replaced without a log: rewrite the rows.
            self.delete_all_rows(ctx, &owner_id)?;
            for (position, element) in list.iter().enumerate() {
                self.insert_at(ctx, &owner_id, position as i64, element)?;
            }
            changed = true;
        }
        Ok(changed)
    }

    /// Managed-record flush: write the net content onto the record's field.
    pub fn flush_record(
        &self,
        ctx: &mut FlushContext<'_>,
        record: &RecordRef,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        if current.is_null() {
            return Ok(record.write().set(
                self.path.clone(),
                AttributeValue::List(RecordingList::new()),
            ));
        }
        let list = current.as_list().ok_or_else(|| {
            FlushError::unsupported(format!(
                "attribute {} holds a non-list value",
                self.name
            ))
        })?;
        let cascaded = self.cascade_elements(ctx, list.iter())?;
        let mut stored = Vec::with_capacity(list.len());
        for element in list.iter() {
            stored.push(AttributeValue::Scalar(element_store_value(element)?));
        }
        let changed = record.write().set(
            self.path.clone(),
            AttributeValue::List(RecordingList::from_elements(stored)),
        );
        Ok(cascaded || changed)
    }

    /// Cascade-delete hook: list rows reference the owner and must go before
    /// the owning row.
    pub fn remove(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
        current: &AttributeValue,
    ) -> FlushResult<()> {
        if let Some(inverse) = &self.inverse {
            return inverse.remove_by_owner_id(ctx, owner_id);
        }
        self.delete_all_rows(ctx, owner_id)?;
        if self.orphan_removal && self.element.is_subview() {
            if let (Some(entity), Some(list)) = (self.element.entity(), current.as_list()) {
                for element in list.iter() {
                    if let Ok(stored) = element_store_value(element) {
                        let statement = StatementBuilder::delete(entity)
                            .where_eq("id", stored)
                            .build();
                        ctx.session().execute(&statement)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns whether changes bump the optimistic-lock version.
    #[must_use]
    pub fn is_optimistic_lock_protected(&self) -> bool {
        self.optimistic_lock_protected
    }
}

fn list_equals(initial: &RecordingList, current: &RecordingList) -> bool {
    initial.len() == current.len()
        && initial
            .iter()
            .zip(current.iter())
            .all(|(a, b)| a.identity_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> AttributeValue {
        AttributeValue::Scalar(ScalarValue::Text(s.into()))
    }

    fn flusher() -> IndexedListAttributeFlusher {
        IndexedListAttributeFlusher::new(
            &AttributeMapping::indexed_list("comments", 0, "comments", TypeDescriptor::basic()),
            "posts",
        )
    }

    #[test]
    fn identical_content_is_clean() {
        let f = flusher();
        let value =
            AttributeValue::List(RecordingList::from_elements(vec![text("a"), text("b")]));
        assert_eq!(f.dirty_kind(Some(&value), &value), DirtyKind::None);
    }

    #[test]
    fn reordered_content_is_mutated() {
        let f = flusher();
        let initial =
            AttributeValue::List(RecordingList::from_elements(vec![text("a"), text("b")]));
        let current =
            AttributeValue::List(RecordingList::from_elements(vec![text("b"), text("a")]));
        assert_eq!(f.dirty_kind(Some(&initial), &current), DirtyKind::Mutated);
    }

    #[test]
    fn size_change_is_mutated() {
        let f = flusher();
        let initial = AttributeValue::List(RecordingList::from_elements(vec![text("a")]));
        let current =
            AttributeValue::List(RecordingList::from_elements(vec![text("a"), text("b")]));
        assert_eq!(f.dirty_kind(Some(&initial), &current), DirtyKind::Mutated);
    }
}
