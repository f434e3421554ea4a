//! Type descriptors.
//!
//! A type descriptor is the static, precomputed classification of an
//! attribute's value type: whether it is mutable, identifiable, managed by
//! the store, which cascades apply, and how dirtiness can be detected. It is
//! computed once at view-type registration time and never mutated.

use crate::error::{FlushError, FlushResult};
use crate::mapping::ViewTypeMapping;
use std::sync::Arc;

/// Static classification of an attribute's value type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    mutable: bool,
    identifiable: bool,
    managed: bool,
    cascade_persist: bool,
    cascade_update: bool,
    supports_dirty_check: bool,
    supports_deep_equality: bool,
    entity: Option<String>,
    subview: Option<Arc<ViewTypeMapping>>,
}

impl TypeDescriptor {
    /// Descriptor for an immutable basic value.
    #[must_use]
    pub fn basic() -> Self {
        Self {
            mutable: false,
            identifiable: false,
            managed: false,
            cascade_persist: false,
            cascade_update: false,
            supports_dirty_check: true,
            supports_deep_equality: true,
            entity: None,
            subview: None,
        }
    }

    /// Descriptor for a mutable basic value.
    ///
    /// A mutable basic value without dirty-check support is always assumed
    /// dirty at flush time.
    #[must_use]
    pub fn mutable_basic(supports_dirty_check: bool) -> Self {
        Self {
            mutable: true,
            identifiable: false,
            managed: false,
            cascade_persist: false,
            cascade_update: true,
            supports_dirty_check,
            supports_deep_equality: supports_dirty_check,
            entity: None,
            subview: None,
        }
    }

    /// Descriptor for a nested view type.
    #[must_use]
    pub fn subview(
        mapping: Arc<ViewTypeMapping>,
        cascade_persist: bool,
        cascade_update: bool,
    ) -> Self {
        let identifiable = mapping.id_slot.is_some();
        let entity = Some(mapping.entity.clone());
        Self {
            mutable: true,
            identifiable,
            managed: false,
            cascade_persist,
            cascade_update,
            supports_dirty_check: true,
            supports_deep_equality: true,
            entity,
            subview: Some(mapping),
        }
    }

    /// Descriptor for a store-managed record type.
    #[must_use]
    pub fn managed_record(entity: impl Into<String>) -> Self {
        Self {
            mutable: true,
            identifiable: true,
            managed: true,
            cascade_persist: false,
            cascade_update: false,
            supports_dirty_check: false,
            supports_deep_equality: false,
            entity: Some(entity.into()),
            subview: None,
        }
    }

    /// Returns whether the value type is a nested view.
    #[must_use]
    pub fn is_subview(&self) -> bool {
        self.subview.is_some()
    }

    /// Returns whether the value type is a store-managed record.
    #[must_use]
    pub fn is_managed_record(&self) -> bool {
        self.managed
    }

    /// Returns whether values of this type can change internally after
    /// construction.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Returns whether values carry a stable identity.
    #[must_use]
    pub fn is_identifiable(&self) -> bool {
        self.identifiable
    }

    /// Returns whether internal mutations of values must be flushed.
    #[must_use]
    pub fn should_flush_mutations(&self) -> bool {
        self.mutable && (self.subview.is_none() || self.cascade_update)
    }

    /// Returns whether dirtiness of a value can be decided by inspection.
    #[must_use]
    pub fn supports_dirty_check(&self) -> bool {
        self.supports_dirty_check
    }

    /// Returns whether two values can be compared deeply for equality.
    #[must_use]
    pub fn supports_deep_equality(&self) -> bool {
        self.supports_deep_equality
    }

    /// Returns whether new values cascade a persist.
    #[must_use]
    pub fn should_cascade_persist(&self) -> bool {
        self.cascade_persist
    }

    /// Returns whether mutated values cascade an update.
    #[must_use]
    pub fn should_cascade_update(&self) -> bool {
        self.cascade_update
    }

    /// Returns the entity name backing this type, if any.
    #[must_use]
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Returns the nested view mapping, if this is a subview type.
    #[must_use]
    pub fn mapping(&self) -> Option<&Arc<ViewTypeMapping>> {
        self.subview.as_ref()
    }

    /// Validates that elements of this type can be diffed for query-based
    /// collection flushing.
    ///
    /// A non-identifiable subview element cannot be matched against the
    /// stored collection when only query flushing is available and deep
    /// equality is unsupported — a configuration-time error, not a
    /// flush-time one.
    pub fn validate_element_for_query_flush(&self, location: &str) -> FlushResult<()> {
        if self.is_subview() && !self.identifiable && !self.supports_deep_equality {
            return Err(FlushError::configuration(format!(
                "attribute {location}: non-identifiable subview elements cannot be \
                 diffed for query flushing"
            )));
        }
        if self.mutable && !self.supports_dirty_check && !self.supports_deep_equality {
            return Err(FlushError::configuration(format!(
                "attribute {location}: mutable elements without dirty-check or deep \
                 equality support cannot be diffed"
            )));
        }
        Ok(())
    }
}
