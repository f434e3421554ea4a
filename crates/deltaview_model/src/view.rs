//! Mutable view objects.
//!
//! A view object is a client-shaped projection of one stored record or
//! embedded composite. It holds a fixed-size slot array (one slot per
//! tracked attribute), a dirty bitmask, and an optional initial-state
//! snapshot taken at load time that the flush engine diffs against.

use crate::dirty::{DirtyMask, MAX_TRACKED_SLOTS};
use crate::error::{ModelError, ModelResult};
use crate::record::RecordRef;
use crate::recording::{RecordingList, RecordingMap};
use crate::value::ScalarValue;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Shared handle to a view object.
///
/// Handles share identity: cloning the handle does not clone the view, and
/// identity comparison of two handles is pointer comparison.
pub type ViewRef = Arc<RwLock<ViewObject>>;

/// A value held in a view slot or record field.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// A scalar column value.
    Scalar(ScalarValue),
    /// A reference to another view object.
    View(ViewRef),
    /// A reference to a managed store-side record.
    Record(RecordRef),
    /// An ordered change-recording container.
    List(RecordingList),
    /// A keyed change-recording container.
    Map(RecordingMap),
}

impl AttributeValue {
    /// The null scalar.
    #[must_use]
    pub fn null() -> Self {
        AttributeValue::Scalar(ScalarValue::Null)
    }

    /// Returns whether this is the null scalar.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Scalar(ScalarValue::Null))
    }

    /// Compares two values by identity.
    ///
    /// Scalars compare by value, view and record handles by pointer
    /// identity, containers by current content.
    #[must_use]
    pub fn identity_eq(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Scalar(a), AttributeValue::Scalar(b)) => a == b,
            (AttributeValue::View(a), AttributeValue::View(b)) => Arc::ptr_eq(a, b),
            (AttributeValue::Record(a), AttributeValue::Record(b)) => Arc::ptr_eq(a, b),
            (AttributeValue::List(a), AttributeValue::List(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.identity_eq(y))
            }
            (AttributeValue::Map(a), AttributeValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
                        ka == kb && va.identity_eq(vb)
                    })
            }
            _ => false,
        }
    }

    /// Returns the scalar content, if any.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            AttributeValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the view handle, if any.
    #[must_use]
    pub fn as_view(&self) -> Option<&ViewRef> {
        match self {
            AttributeValue::View(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the record handle, if any.
    #[must_use]
    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            AttributeValue::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the list content, if any.
    #[must_use]
    pub fn as_list(&self) -> Option<&RecordingList> {
        match self {
            AttributeValue::List(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the map content, if any.
    #[must_use]
    pub fn as_map(&self) -> Option<&RecordingMap> {
        match self {
            AttributeValue::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a short name for the value's shape, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttributeValue::Scalar(v) => v.kind_name(),
            AttributeValue::View(_) => "view",
            AttributeValue::Record(_) => "record",
            AttributeValue::List(_) => "list",
            AttributeValue::Map(_) => "map",
        }
    }

    /// Returns a snapshot copy suitable for an initial-state array.
    ///
    /// Containers are copied without their action logs; view and record
    /// handles keep their identity.
    #[must_use]
    pub fn snapshot(&self) -> AttributeValue {
        match self {
            AttributeValue::List(list) => AttributeValue::List(list.clone_content()),
            AttributeValue::Map(map) => AttributeValue::Map(map.clone_content()),
            other => other.clone(),
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.identity_eq(other)
    }
}

impl From<ScalarValue> for AttributeValue {
    fn from(v: ScalarValue) -> Self {
        AttributeValue::Scalar(v)
    }
}

/// Back-reference from a view object to its owning container.
#[derive(Debug, Clone)]
pub struct ParentLink {
    /// The owning view.
    pub owner: Weak<RwLock<ViewObject>>,
    /// The slot in the owner that holds this view.
    pub slot: usize,
}

/// A mutable, client-shaped projection of one stored record.
#[derive(Debug)]
pub struct ViewObject {
    type_name: String,
    id: Option<ScalarValue>,
    is_new: bool,
    state: Vec<AttributeValue>,
    initial: Option<Vec<AttributeValue>>,
    dirty: DirtyMask,
    parent: Option<ParentLink>,
}

impl ViewObject {
    /// Creates a new transient view (not yet persisted, no initial state).
    pub fn new_transient(
        type_name: impl Into<String>,
        state: Vec<AttributeValue>,
    ) -> ModelResult<Self> {
        Self::check_slot_count(state.len())?;
        Ok(Self {
            type_name: type_name.into(),
            id: None,
            is_new: true,
            state,
            initial: None,
            dirty: DirtyMask::empty(),
            parent: None,
        })
    }

    /// Creates a loaded view with an initial-state snapshot.
    pub fn loaded(
        type_name: impl Into<String>,
        id: ScalarValue,
        state: Vec<AttributeValue>,
    ) -> ModelResult<Self> {
        Self::check_slot_count(state.len())?;
        let initial = state.iter().map(AttributeValue::snapshot).collect();
        Ok(Self {
            type_name: type_name.into(),
            id: Some(id),
            is_new: false,
            state,
            initial: Some(initial),
            dirty: DirtyMask::empty(),
            parent: None,
        })
    }

    fn check_slot_count(count: usize) -> ModelResult<()> {
        if count > MAX_TRACKED_SLOTS {
            return Err(ModelError::TooManySlots {
                count,
                max: MAX_TRACKED_SLOTS,
            });
        }
        Ok(())
    }

    /// Wraps the view in a shared handle.
    #[must_use]
    pub fn wrap(self) -> ViewRef {
        Arc::new(RwLock::new(self))
    }

    /// Returns the view type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the view's id value, if assigned.
    #[must_use]
    pub fn id(&self) -> Option<&ScalarValue> {
        self.id.as_ref()
    }

    /// Assigns the view's id value.
    pub fn set_id(&mut self, id: ScalarValue) {
        self.id = Some(id);
    }

    /// Returns whether the view has never been persisted.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Marks the view as persisted.
    pub fn mark_persisted(&mut self) {
        self.is_new = false;
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.state.len()
    }

    /// Returns the value in `slot`.
    pub fn get(&self, slot: usize) -> ModelResult<&AttributeValue> {
        self.state
            .get(slot)
            .ok_or_else(|| ModelError::slot_out_of_range(slot, self.state.len()))
    }

    /// Sets `slot` to `value`, flipping its dirty bit.
    pub fn set(&mut self, slot: usize, value: AttributeValue) -> ModelResult<()> {
        let len = self.state.len();
        let target = self
            .state
            .get_mut(slot)
            .ok_or_else(|| ModelError::slot_out_of_range(slot, len))?;
        *target = value;
        self.dirty.set(slot);
        Ok(())
    }

    /// Sets `slot` to `value` without flipping its dirty bit.
    ///
    /// Used by the flush engine to write back assigned ids and bumped
    /// versions.
    pub fn set_untracked(&mut self, slot: usize, value: AttributeValue) -> ModelResult<()> {
        let len = self.state.len();
        let target = self
            .state
            .get_mut(slot)
            .ok_or_else(|| ModelError::slot_out_of_range(slot, len))?;
        *target = value;
        Ok(())
    }

    /// Returns a mutable handle to the list in `slot`, flipping its dirty bit.
    ///
    /// The slot is conservatively marked dirty; whether anything actually
    /// changed is decided from the container's action log at flush time.
    pub fn list_mut(&mut self, slot: usize) -> ModelResult<&mut RecordingList> {
        let len = self.state.len();
        let value = self
            .state
            .get_mut(slot)
            .ok_or_else(|| ModelError::slot_out_of_range(slot, len))?;
        match value {
            AttributeValue::List(list) => {
                self.dirty.set(slot);
                Ok(list)
            }
            other => Err(ModelError::type_mismatch("list", other.kind_name())),
        }
    }

    /// Returns a mutable handle to the map in `slot`, flipping its dirty bit.
    pub fn map_mut(&mut self, slot: usize) -> ModelResult<&mut RecordingMap> {
        let len = self.state.len();
        let value = self
            .state
            .get_mut(slot)
            .ok_or_else(|| ModelError::slot_out_of_range(slot, len))?;
        match value {
            AttributeValue::Map(map) => {
                self.dirty.set(slot);
                Ok(map)
            }
            other => Err(ModelError::type_mismatch("map", other.kind_name())),
        }
    }

    /// Returns the initial value of `slot`, if a snapshot exists.
    #[must_use]
    pub fn initial(&self, slot: usize) -> Option<&AttributeValue> {
        self.initial.as_ref().and_then(|initial| initial.get(slot))
    }

    /// Returns whether an initial-state snapshot exists.
    #[must_use]
    pub fn has_initial_state(&self) -> bool {
        self.initial.is_some()
    }

    /// Returns the dirty mask.
    #[must_use]
    pub fn dirty(&self) -> &DirtyMask {
        &self.dirty
    }

    /// Returns whether `slot` is dirty.
    #[must_use]
    pub fn is_dirty(&self, slot: usize) -> bool {
        self.dirty.test(slot)
    }

    /// Returns whether any slot is dirty.
    #[must_use]
    pub fn is_any_dirty(&self) -> bool {
        self.dirty.any()
    }

    /// Resets the view to a clean state after a successful flush.
    ///
    /// Clears the dirty mask, drops container action logs, and re-snapshots
    /// the current content as the new initial state.
    pub fn mark_clean(&mut self) {
        self.dirty.clear_all();
        for value in &mut self.state {
            match value {
                AttributeValue::List(list) => list.reset_actions(),
                AttributeValue::Map(map) => map.reset_actions(),
                _ => {}
            }
        }
        let initial = self.state.iter().map(AttributeValue::snapshot).collect();
        self.initial = Some(initial);
    }

    /// Returns the owner back-reference, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    /// Sets the owner back-reference.
    pub fn set_parent(&mut self, owner: &ViewRef, slot: usize) {
        self.parent = Some(ParentLink {
            owner: Arc::downgrade(owner),
            slot,
        });
    }

    /// Clears the owner back-reference.
    pub fn clear_parent(&mut self) {
        self.parent = None;
    }
}
