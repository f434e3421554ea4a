//! Attribute flushers.
//!
//! One flusher per attribute shape, expressed as a closed sum type. Each
//! variant knows how to detect its own dirtiness, contribute to a statement,
//! or mutate a managed record directly. "Dirty" flusher instances are
//! short-lived: freshly constructed per flush call from the cached full
//! template plus the observed diff, and they never flush more than the
//! attributes they were told are dirty.

mod basic;
mod collection;
mod composite;
mod embeddable;
mod indexed_list;
mod map;
mod parent_ref;
mod subview;
mod version;

pub use basic::BasicAttributeFlusher;
pub use collection::CollectionAttributeFlusher;
pub use composite::CompositeAttributeFlusher;
pub use embeddable::EmbeddableAttributeFlusher;
pub use indexed_list::IndexedListAttributeFlusher;
pub use map::MapAttributeFlusher;
pub use parent_ref::ParentRefAttributeFlusher;
pub use subview::SubviewAttributeFlusher;
pub use version::VersionAttributeFlusher;

use crate::context::FlushContext;
use crate::descriptor::TypeDescriptor;
use crate::error::{FlushError, FlushResult};
use crate::fetch_graph::FetchGraphNode;
use crate::session::Statement;
use deltaview_model::{AttributeValue, DirtyKind, RecordRef, ScalarValue, ViewRef};

/// A flusher for one attribute of a view type.
#[derive(Debug, Clone)]
pub enum AttributeFlusher {
    /// Basic scalar column.
    Basic(BasicAttributeFlusher),
    /// Embedded composite flattened into the owner row.
    Embeddable(EmbeddableAttributeFlusher),
    /// Reference to another view.
    Subview(SubviewAttributeFlusher),
    /// Unordered collection.
    Collection(CollectionAttributeFlusher),
    /// Ordered collection with a positional index.
    IndexedList(IndexedListAttributeFlusher),
    /// Keyed collection.
    Map(MapAttributeFlusher),
    /// Back-reference whose foreign key lives on the child row.
    ParentRef(ParentRefAttributeFlusher),
}

impl AttributeFlusher {
    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            AttributeFlusher::Basic(f) => f.name(),
            AttributeFlusher::Embeddable(f) => f.name(),
            AttributeFlusher::Subview(f) => f.name(),
            AttributeFlusher::Collection(f) => f.name(),
            AttributeFlusher::IndexedList(f) => f.name(),
            AttributeFlusher::Map(f) => f.name(),
            AttributeFlusher::ParentRef(f) => f.name(),
        }
    }

    /// Returns the view slot this flusher covers.
    #[must_use]
    pub fn slot(&self) -> usize {
        match self {
            AttributeFlusher::Basic(f) => f.slot(),
            AttributeFlusher::Embeddable(f) => f.slot(),
            AttributeFlusher::Subview(f) => f.slot(),
            AttributeFlusher::Collection(f) => f.slot(),
            AttributeFlusher::IndexedList(f) => f.slot(),
            AttributeFlusher::Map(f) => f.slot(),
            AttributeFlusher::ParentRef(f) => f.slot(),
        }
    }

    /// Classifies the change between the initial and current value.
    #[must_use]
    pub fn dirty_kind(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> DirtyKind {
        match self {
            AttributeFlusher::Basic(f) => f.dirty_kind(initial, current),
            AttributeFlusher::Embeddable(f) => f.dirty_kind(initial, current),
            AttributeFlusher::Subview(f) => f.dirty_kind(initial, current),
            AttributeFlusher::Collection(f) => f.dirty_kind(initial, current),
            AttributeFlusher::IndexedList(f) => f.dirty_kind(initial, current),
            AttributeFlusher::Map(f) => f.dirty_kind(initial, current),
            AttributeFlusher::ParentRef(_) => DirtyKind::None,
        }
    }

    /// Returns a flusher scoped to the observed diff, or `None` when there
    /// is nothing to flush.
    pub fn dirty_flusher(
        &self,
        initial: Option<&AttributeValue>,
        current: &AttributeValue,
    ) -> FlushResult<Option<AttributeFlusher>> {
        match self {
            AttributeFlusher::Basic(f) => Ok(f
                .dirty_flusher(initial, current)
                .map(AttributeFlusher::Basic)),
            AttributeFlusher::Embeddable(f) => Ok(f
                .dirty_flusher(initial, current)
                .map(AttributeFlusher::Embeddable)),
            AttributeFlusher::Subview(f) => Ok(f
                .dirty_flusher(initial, current)
                .map(AttributeFlusher::Subview)),
            AttributeFlusher::Collection(f) => Ok(f
                .dirty_flusher(initial, current)
                .map(AttributeFlusher::Collection)),
            AttributeFlusher::IndexedList(f) => Ok(f
                .dirty_flusher(initial, current)
                .map(AttributeFlusher::IndexedList)),
            AttributeFlusher::Map(f) => Ok(f
                .dirty_flusher(initial, current)
                .map(AttributeFlusher::Map)),
            AttributeFlusher::ParentRef(_) => Ok(None),
        }
    }

    /// Returns whether the attribute can be expressed as a statement
    /// fragment.
    #[must_use]
    pub fn supports_query_flush(&self) -> bool {
        match self {
            AttributeFlusher::Basic(_)
            | AttributeFlusher::Embeddable(_)
            | AttributeFlusher::Subview(_)
            | AttributeFlusher::ParentRef(_) => true,
            AttributeFlusher::Collection(f) => f.supports_query_flush(),
            AttributeFlusher::IndexedList(f) => f.supports_query_flush(),
            AttributeFlusher::Map(f) => f.supports_query_flush(),
        }
    }

    /// Contributes to the owner update statement or issues collection
    /// statements directly. Returns whether anything was flushed.
    pub fn flush_query(
        &self,
        ctx: &mut FlushContext<'_>,
        view: &ViewRef,
        owner_update: Option<&mut Statement>,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        match self {
            AttributeFlusher::Basic(f) => f.flush_query(owner_update, current),
            AttributeFlusher::Embeddable(f) => f.flush_query(ctx, owner_update, current),
            AttributeFlusher::Subview(f) => f.flush_query(ctx, view, owner_update, current),
            AttributeFlusher::Collection(f) => f.flush_query(ctx, view, current),
            AttributeFlusher::IndexedList(f) => f.flush_query(ctx, view, current),
            AttributeFlusher::Map(f) => f.flush_query(ctx, view, current),
            AttributeFlusher::ParentRef(f) => f.reject("flush_query"),
        }
    }

    /// Mutates the managed record directly. Returns whether anything was
    /// actually changed.
    pub fn flush_record(
        &self,
        ctx: &mut FlushContext<'_>,
        record: &RecordRef,
        view: &ViewRef,
        current: &AttributeValue,
    ) -> FlushResult<bool> {
        match self {
            AttributeFlusher::Basic(f) => f.flush_record(record, current),
            AttributeFlusher::Embeddable(f) => f.flush_record(ctx, record, current),
            AttributeFlusher::Subview(f) => f.flush_record(ctx, record, view, current),
            AttributeFlusher::Collection(f) => f.flush_record(ctx, record, current),
            AttributeFlusher::IndexedList(f) => f.flush_record(ctx, record, current),
            AttributeFlusher::Map(f) => f.flush_record(ctx, record, current),
            AttributeFlusher::ParentRef(_) => Ok(false),
        }
    }

    /// Cascade-delete hook run around the owning-row delete.
    pub fn remove(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
        current: &AttributeValue,
    ) -> FlushResult<()> {
        match self {
            AttributeFlusher::Basic(_) => Ok(()),
            AttributeFlusher::Embeddable(_) => Ok(()),
            AttributeFlusher::Subview(f) => f.remove(ctx, owner_id, current),
            AttributeFlusher::Collection(f) => f.remove(ctx, owner_id, current),
            AttributeFlusher::IndexedList(f) => f.remove(ctx, owner_id, current),
            AttributeFlusher::Map(f) => f.remove(ctx, owner_id, current),
            AttributeFlusher::ParentRef(f) => f.remove(ctx, owner_id),
        }
    }

    /// Returns whether the cascade must run after the owning-row delete.
    ///
    /// Pre-delete cascades run before the owning row is deleted; post-delete
    /// cascades run after, to avoid foreign-key violations when the cascade
    /// target is still referenced by the owner.
    #[must_use]
    pub fn requires_delete_cascade_after_remove(&self) -> bool {
        match self {
            AttributeFlusher::Subview(f) => f.requires_delete_cascade_after_remove(),
            _ => false,
        }
    }

    /// Returns whether changes to this attribute bump the optimistic-lock
    /// version.
    #[must_use]
    pub fn is_optimistic_lock_protected(&self) -> bool {
        match self {
            AttributeFlusher::Basic(f) => f.is_optimistic_lock_protected(),
            AttributeFlusher::Embeddable(f) => f.is_optimistic_lock_protected(),
            AttributeFlusher::Subview(f) => f.is_optimistic_lock_protected(),
            AttributeFlusher::Collection(f) => f.is_optimistic_lock_protected(),
            AttributeFlusher::IndexedList(f) => f.is_optimistic_lock_protected(),
            AttributeFlusher::Map(f) => f.is_optimistic_lock_protected(),
            AttributeFlusher::ParentRef(_) => false,
        }
    }

    /// Returns whether the attribute never produces statements.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        match self {
            AttributeFlusher::Basic(f) => f.is_passthrough(),
            AttributeFlusher::ParentRef(_) => true,
            _ => false,
        }
    }

    /// Returns the fetch graph contribution of this attribute.
    #[must_use]
    pub fn fetch_graph(&self) -> Option<FetchGraphNode> {
        let (name, fetches) = match self {
            AttributeFlusher::Basic(f) => return f.fetch_graph(),
            AttributeFlusher::Embeddable(f) => (f.name(), f.fetches()),
            AttributeFlusher::Subview(f) => (f.name(), f.fetches()),
            AttributeFlusher::Collection(f) => (f.name(), f.fetches()),
            AttributeFlusher::IndexedList(f) => (f.name(), f.fetches()),
            AttributeFlusher::Map(f) => (f.name(), f.fetches()),
            AttributeFlusher::ParentRef(f) => (f.name(), f.fetches()),
        };
        Some(FetchGraphNode::with_fetches(name, fetches.iter().cloned()))
    }
}

/// Reads a subview or record element's stored identity, or passes a scalar
/// through.
pub(crate) fn element_store_value(value: &AttributeValue) -> FlushResult<ScalarValue> {
    match value {
        AttributeValue::Scalar(scalar) => Ok(scalar.clone()),
        AttributeValue::View(view) => view.read().id().cloned().ok_or_else(|| {
            FlushError::unsupported("subview element has no id; it must be persisted first")
        }),
        AttributeValue::Record(record) => record.read().id().cloned().ok_or_else(|| {
            FlushError::unsupported("record element has no id; it must be persisted first")
        }),
        AttributeValue::List(_) | AttributeValue::Map(_) => Err(FlushError::unsupported(
            "nested containers cannot be stored as collection elements",
        )),
    }
}

/// Returns whether an element value has changes of its own to flush.
pub(crate) fn element_is_dirty(value: &AttributeValue) -> bool {
    match value.as_view() {
        Some(view) => {
            let guard = view.read();
            guard.is_new() || guard.is_any_dirty()
        }
        None => false,
    }
}

/// Flushes a nested view through its own composite flusher, persisting it
/// when new and cascading its dirty attributes otherwise.
pub(crate) fn flush_nested_view(
    ctx: &mut FlushContext<'_>,
    descriptor: &TypeDescriptor,
    child: &ViewRef,
) -> FlushResult<bool> {
    let Some(mapping) = descriptor.mapping() else {
        return Ok(false);
    };
    let composite = CompositeAttributeFlusher::for_mapping(mapping)?;
    composite.flush(ctx, child)
}
