//! Map flusher.

use crate::context::FlushContext;
use crate::descriptor::TypeDescriptor;
use crate::error::{FlushError, FlushResult};
use crate::flusher::{element_is_dirty, element_store_value, flush_nested_view};
use crate::fused::FusedMapActions;
use crate::inverse::InverseFlusher;
use crate::mapping::AttributeMapping;
use crate::statement::StatementBuilder;
use deltaview_model::{
    AttributeValue, DirtyKind, RecordRef, RecordingMap, ScalarValue, ViewRef,
};
use tracing::trace;

/// Flusher for a keyed collection attribute.
#[derive(Debug, Clone)]
pub struct MapAttributeFlusher {
    name: String,
    slot: usize,
    path: String,
    element: TypeDescriptor,
    owner_entity: String,
    owner_column: String,
    element_column: String,
    key_column: String,
    key_is_element_id: bool,
    updatable: bool,
    optimistic_lock_protected: bool,
    orphan_removal: bool,
    inverse: Option<InverseFlusher>,
    fetches: Vec<String>,
    /// Dirty-instance state: the entry content at load time.
    initial_entries: Option<Vec<(ScalarValue, AttributeValue)>>,
}

impl MapAttributeFlusher {
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
            key_column: mapping.key_column.clone(),
            key_is_element_id: mapping.key_is_element_id,
            updatable: mapping.updatable,
            optimistic_lock_protected: mapping.optimistic_lock_protected,
            orphan_removal: mapping.orphan_removal,
            inverse: mapping.inverse.as_ref().map(InverseFlusher::from_mapping),
            fetches: mapping.fetches.clone(),
            initial_entries: None,
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

    /// Returns whether the map can be flushed with statements.
    #[must_use]
    pub fn supports_query_flush(&self) -> bool {
        true
    }

    /// Classifies the change between initial and current content.
    #[must_use]
    pub fn dirty_kind(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> DirtyKind {
        let initial_map = initial.and_then(AttributeValue::as_map);
        let current_map = current.as_map();
        let (initial_map, current_map) = match (initial_map, current_map) {
            (None, None) => return DirtyKind::None,
            (None, Some(_)) | (Some(_), None) => return DirtyKind::Updated,
            (Some(a), Some(b)) => (a, b),
        };
        if current_map.has_actions() {
            return DirtyKind::Mutated;
        }
        if initial_map.len() != current_map.len() {
            return DirtyKind::Mutated;
        }
        if self.element.should_flush_mutations() && !self.element.supports_dirty_check() {
            // Without dirty checking, dirtiness must be assumed.
            return DirtyKind::Mutated;
        }
        for ((key_a, value_a), (key_b, value_b)) in initial_map.iter().zip(current_map.iter()) {
            if key_a != key_b || !value_a.identity_eq(value_b) {
                return DirtyKind::Mutated;
            }
            if self.element.should_flush_mutations() && element_is_dirty(value_b) {
                return DirtyKind::Mutated;
            }
        }
        DirtyKind::None
    }

    /// Returns a flusher scoped to the diff, or `None`.
    #[must_use]
    pub fn dirty_flusher(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> Option<MapAttributeFlusher> {
        if !self.updatable && !self.element.should_flush_mutations() {
            return None;
        }
        if self.dirty_kind(initial, current) == DirtyKind::None {
            return None;
        }
        let mut dirty = self.clone();
        dirty.initial_entries = initial.and_then(AttributeValue::as_map).map(|map| {
            map.iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        });
        Some(dirty)
    }

    fn owner_id(&self, view: &ViewRef) -> FlushResult<ScalarValue> {
        view.read().id().cloned().ok_or_else(|| {
            FlushError::unsupported(format!(
                "attribute {}: flushing a map requires an owner id",
                self.name
            ))
        })
    }

    fn cascade_values<'a>(
        &self,
        ctx: &mut FlushContext<'_>,
        values: impl Iterator<Item = &'a AttributeValue>,
    ) -> FlushResult<bool> {
        let mut changed = false;
        for value in values {
            let Some(child) = value.as_view() else { continue };
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

    /// Re-keys entries whose key is the element's stored identity after a
    /// cascaded persist assigned that identity.
    ///
    /// The entry must be moved out of the keyed container before its id is
    /// used, then re-inserted under the assigned key; otherwise the
    /// container's internal index no longer matches the entry.
    fn rekey_persisted_entries(
        &self,
        view: &ViewRef,
        added: &[(ScalarValue, AttributeValue)],
    ) -> FlushResult<Vec<(ScalarValue, AttributeValue)>> {
        let mut rekeyed = Vec::with_capacity(added.len());
        for (key, value) in added {
            let stored_key = match value.as_view() {
                Some(child) if self.key_is_element_id => {
                    child.read().id().cloned().unwrap_or_else(|| key.clone())
                }
                _ => key.clone(),
            };
            if stored_key != *key {
                let mut guard = view.write();
                let map = guard.map_mut(self.slot)?;
                map.rekey(key, stored_key.clone())?;
            }
            rekeyed.push((stored_key, value.clone()));
        }
        Ok(rekeyed)
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

    fn insert_entry(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
        key: &ScalarValue,
        value: &AttributeValue,
    ) -> FlushResult<()> {
        let stored = element_store_value(value)?;
        let statement = StatementBuilder::insert(&self.owner_entity)
            .collection(&self.path)
            .set(&self.owner_column, owner_id.clone())
            .set(&self.key_column, key.clone())
            .set(&self.element_column, stored)
            .build();
        ctx.session().execute(&statement)?;
        Ok(())
    }

    fn content_differs(&self, current: &RecordingMap) -> bool {
        match &self.initial_entries {
            Some(initial) => {
                initial.len() != current.len()
                    || initial
                        .iter()
                        .zip(current.iter())
                        .any(|((key_a, value_a), (key_b, value_b))| {
                            key_a != key_b || !value_a.identity_eq(value_b)
                        })
            }
            None => true,
        }
    }

    /// Statement-based flush: fuse the action log and issue map DML.
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
        let map = current.as_map().ok_or_else(|| {
            FlushError::unsupported(format!("attribute {} holds a non-map value", self.name))
        })?;
        let mut changed = self.cascade_values(ctx, map.iter().map(|(_, value)| value))?;
        if map.has_actions() {
            let fused = FusedMapActions::new(map.actions(), &element_is_dirty);
            trace!(
                attribute = %self.name,
                operations = fused.operation_count(),
                "fused map actions"
            );
            for (key, value) in fused.removed() {
                let statement = StatementBuilder::delete(&self.owner_entity)
                    .collection(&self.path)
                    .where_eq(&self.owner_column, owner_id.clone())
                    .where_eq(&self.key_column, key.clone())
                    .build();
                ctx.session().execute(&statement)?;
                if self.orphan_removal && self.element.is_subview() {
                    if let (Some(entity), Ok(stored)) =
                        (self.element.entity(), element_store_value(value))
                    {
                        let child_delete = StatementBuilder::delete(entity)
                            .where_eq("id", stored)
                            .build();
                        ctx.session().execute(&child_delete)?;
                    }
                }
            }
            let added: Vec<(ScalarValue, AttributeValue)> = fused
                .added()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            for (key, value) in self.rekey_persisted_entries(view, &added)? {
                self.insert_entry(ctx, &owner_id, &key, &value)?;
            }
            for (key, (_, new_value)) in fused.replaced() {
                let stored = element_store_value(new_value)?;
                let statement = StatementBuilder::update(&self.owner_entity)
                    .collection(&self.path)
                    .set(&self.element_column, stored)
                    .where_eq(&self.owner_column, owner_id.clone())
                    .where_eq(&self.key_column, key.clone())
                    .build();
                ctx.session().execute(&statement)?;
            }
            changed |= fused.operation_count() > 0;
        } else if self.content_differs(map) {
            // The container was replaced without a log: rewrite the rows.
            self.delete_all_rows(ctx, &owner_id)?;
            let entries: Vec<(ScalarValue, AttributeValue)> = map
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            for (key, value) in self.rekey_persisted_entries(view, &entries)? {
                self.insert_entry(ctx, &owner_id, &key, &value)?;
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
            return Ok(record
                .write()
                .set(self.path.clone(), AttributeValue::Map(RecordingMap::new())));
        }
        let map = current.as_map().ok_or_else(|| {
            FlushError::unsupported(format!("attribute {} holds a non-map value", self.name))
        })?;
        let cascaded = self.cascade_values(ctx, map.iter().map(|(_, value)| value))?;
        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map.iter() {
            entries.push((
                key.clone(),
                AttributeValue::Scalar(element_store_value(value)?),
            ));
        }
        let changed = record.write().set(
            self.path.clone(),
            AttributeValue::Map(RecordingMap::from_entries(entries)),
        );
        Ok(cascaded || changed)
    }

    /// Cascade-delete hook: map rows reference the owner and must go before
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
            if let (Some(entity), Some(map)) = (self.element.entity(), current.as_map()) {
                for (_, value) in map.iter() {
                    if let Ok(stored) = element_store_value(value) {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ScalarValue {
        ScalarValue::Text(s.into())
    }

    fn val(i: i64) -> AttributeValue {
        AttributeValue::Scalar(ScalarValue::Integer(i))
    }

    fn flusher() -> MapAttributeFlusher {
        MapAttributeFlusher::new(
            &AttributeMapping::map(
                "tags",
                0,
                "tags",
                TypeDescriptor::basic(),
                TypeDescriptor::basic(),
            ),
            "posts",
        )
    }

    #[test]
    fn identical_content_is_clean() {
        let f = flusher();
        let value =
            AttributeValue::Map(RecordingMap::from_entries(vec![(key("a"), val(1))]));
        assert_eq!(f.dirty_kind(Some(&value), &value), DirtyKind::None);
    }

    #[test]
    fn recorded_actions_are_mutated() {
        let f = flusher();
        let initial =
            AttributeValue::Map(RecordingMap::from_entries(vec![(key("a"), val(1))]));
        let mut map = RecordingMap::from_entries(vec![(key("a"), val(1))]);
        map.put(key("b"), val(2));
        let current = AttributeValue::Map(map);
        assert_eq!(f.dirty_kind(Some(&initial), &current), DirtyKind::Mutated);
    }

    #[test]
    fn key_change_is_mutated() {
        let f = flusher();
        let initial =
            AttributeValue::Map(RecordingMap::from_entries(vec![(key("a"), val(1))]));
        let current =
            AttributeValue::Map(RecordingMap::from_entries(vec![(key("b"), val(1))]));
        assert_eq!(f.dirty_kind(Some(&initial), &current), DirtyKind::Mutated);
    }
}
