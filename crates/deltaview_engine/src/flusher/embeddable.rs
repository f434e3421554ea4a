//! Embedded composite flusher.

use crate::context::FlushContext;
use crate::error::{FlushError, FlushResult};
use crate::flusher::{AttributeFlusher, BasicAttributeFlusher, SubviewAttributeFlusher};
use crate::mapping::{AttributeKind, AttributeMapping, ViewTypeMapping};
use crate::session::Statement;
use deltaview_model::{AttributeValue, DirtyKind, RecordRef, ScalarValue, ViewRef};
use std::sync::Arc;

/// Flusher for an embedded composite flattened into the owner's row.
///
/// Delegates to the nested flushers only when the nested object's own dirty
/// mask is set; a nested value that became null routes through an
/// owner-aware null-out of every nested column rather than a plain update.
#[derive(Debug, Clone)]
pub struct EmbeddableAttributeFlusher {
    name: String,
    slot: usize,
    mapping: Arc<ViewTypeMapping>,
    nested: Vec<AttributeFlusher>,
    updatable: bool,
    optimistic_lock_protected: bool,
    fetches: Vec<String>,
    /// Dirty-instance state: the whole embedded object was replaced.
    replaced: bool,
    /// Dirty-instance state: the embedded value became null.
    became_null: bool,
}

impl EmbeddableAttributeFlusher {
    /// Builds the flusher from an attribute mapping.
    ///
    /// Embedded composites carry singular attributes only; plural or
    /// version attributes inside one are a configuration error.
    pub fn new(mapping: &AttributeMapping) -> FlushResult<Self> {
        let nested_mapping = mapping.descriptor.mapping().ok_or_else(|| {
            FlushError::configuration(format!(
                "attribute {}: embedded attribute needs a composite descriptor",
                mapping.name
            ))
        })?;
        let mut nested = Vec::new();
        for attribute in &nested_mapping.attributes {
            match attribute.kind {
                AttributeKind::Basic => {
                    nested.push(AttributeFlusher::Basic(BasicAttributeFlusher::new(attribute)));
                }
                AttributeKind::Subview => {
                    nested.push(AttributeFlusher::Subview(SubviewAttributeFlusher::new(
                        attribute,
                    )?));
                }
                _ => {
                    return Err(FlushError::configuration(format!(
                        "attribute {}: embedded composites support singular \
                         attributes only",
                        attribute.location(&nested_mapping.name)
                    )));
                }
            }
        }
        Ok(Self {
            name: mapping.name.clone(),
            slot: mapping.slot,
            mapping: Arc::clone(nested_mapping),
            nested,
            updatable: mapping.updatable,
            optimistic_lock_protected: mapping.optimistic_lock_protected,
            fetches: mapping.fetches.clone(),
            replaced: false,
            became_null: false,
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
        self.slot
    }

    /// Returns the nested fetch paths.
    #[must_use]
    pub fn fetches(&self) -> &[String] {
        &self.fetches
    }

    /// Classifies the change of the embedded value.
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
                    DirtyKind::Updated
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
    ) -> Option<EmbeddableAttributeFlusher> {
        if !self.updatable {
            return None;
        }
        let kind = self.dirty_kind(initial, current);
        if kind == DirtyKind::None {
            return None;
        }
        let mut dirty = self.clone();
        dirty.replaced = kind == DirtyKind::Updated;
        dirty.became_null =
            current.is_null() && initial.map(|value| !value.is_null()).unwrap_or(false);
        Some(dirty)
    }

    /// Collects the nested values to flush: all of them when the embedded
    /// object was replaced, only the nested-dirty ones otherwise.
    fn dirty_nested_values(
        &self,
        child: &ViewRef,
    ) -> FlushResult<Vec<(usize, AttributeValue)>> {
        let guard = child.read();
        let mut values = Vec::new();
        for (index, flusher) in self.nested.iter().enumerate() {
            if self.replaced || guard.is_dirty(flusher.slot()) {
                values.push((index, guard.get(flusher.slot())?.clone()));
            }
        }
        Ok(values)
    }

    /// Statement-based flush.
    pub fn flush_query(
        &self,
        ctx: &mut FlushContext<'_>,
        mut owner_update: Option<&mut Statement>,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        if self.became_null {
            let statement = owner_update.ok_or_else(|| {
                FlushError::unsupported(format!(
                    "attribute {}: embedded null-out requires an owner statement",
                    self.name
                ))
            })?;
            for attribute in &self.mapping.attributes {
                statement
                    .assignments
                    .push((attribute.column.clone(), ScalarValue::Null));
            }
            return Ok(true);
        }
        let Some(child) = current.as_view() else {
            return Ok(false);
        };
        let values = self.dirty_nested_values(child)?;
        let mut changed = false;
        for (index, value) in values {
            changed |= self.nested[index].flush_query(
                ctx,
                child,
                owner_update.as_deref_mut(),
                &value,
            )?;
        }
        Ok(changed)
    }

    /// Managed-record flush.
    pub fn flush_record(
        &self,
        ctx: &mut FlushContext<'_>,
        record: &RecordRef,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        if self.became_null {
            let mut changed = false;
            for attribute in &self.mapping.attributes {
                changed |= record
                    .write()
                    .set(attribute.column.clone(), AttributeValue::null());
            }
            return Ok(changed);
        }
        let Some(child) = current.as_view() else {
            return Ok(false);
        };
        let values = self.dirty_nested_values(child)?;
        let mut changed = false;
        for (index, value) in values {
            changed |= self.nested[index].flush_record(ctx, record, child, &value)?;
        }
        Ok(changed)
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
    use deltaview_model::ViewObject;

    fn address_mapping() -> Arc<ViewTypeMapping> {
        Arc::new(
            ViewTypeMapping::new("AddressView", "posts")
                .with_attribute(AttributeMapping::basic("city", 0, "address_city"))
                .with_attribute(AttributeMapping::basic("zip", 1, "address_zip")),
        )
    }

    fn embedded_flusher() -> EmbeddableAttributeFlusher {
        EmbeddableAttributeFlusher::new(&AttributeMapping::embedded(
            "address",
            2,
            address_mapping(),
        ))
        .unwrap()
    }

    fn address(city: &str) -> ViewRef {
        ViewObject::loaded(
            "AddressView",
            ScalarValue::Null,
            vec![
                AttributeValue::Scalar(ScalarValue::Text(city.into())),
                AttributeValue::Scalar(ScalarValue::Text("1010".into())),
            ],
        )
        .unwrap()
        .wrap()
    }

    #[test]
    fn plural_nested_attributes_are_rejected() {
        let nested = Arc::new(
            ViewTypeMapping::new("BadView", "posts").with_attribute(AttributeMapping::collection(
                "tags",
                0,
                "tags",
                crate::descriptor::TypeDescriptor::basic(),
            )),
        );
        let result =
            EmbeddableAttributeFlusher::new(&AttributeMapping::embedded("bad", 0, nested));
        assert!(matches!(result, Err(FlushError::Configuration { .. })));
    }

    #[test]
    fn clean_embedded_value_reports_none() {
        let f = embedded_flusher();
        let value = AttributeValue::View(address("vienna"));
        assert_eq!(f.dirty_kind(Some(&value), &value), DirtyKind::None);
        assert!(f.dirty_flusher(Some(&value), &value).is_none());
    }

    #[test]
    fn nested_dirty_mask_reports_mutated() {
        let f = embedded_flusher();
        let child = address("vienna");
        child
            .write()
            .set(0, AttributeValue::Scalar(ScalarValue::Text("graz".into())))
            .unwrap();
        let value = AttributeValue::View(child);
        assert_eq!(f.dirty_kind(Some(&value), &value), DirtyKind::Mutated);
    }

    #[test]
    fn null_out_is_captured() {
        let f = embedded_flusher();
        let value = AttributeValue::View(address("vienna"));
        let dirty = f.dirty_flusher(Some(&value), &AttributeValue::null()).unwrap();
        assert!(dirty.became_null);
    }
}
