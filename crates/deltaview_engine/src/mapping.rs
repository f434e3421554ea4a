//! View-type mappings.
//!
//! A mapping is the registration-time description of one view type: its
//! backing entity, the slot/column table for every tracked attribute, flush
//! mode and strategy, and the unmapped-relation cascades that must run
//! around a row delete. The composite flusher template is built from it, so
//! configuration errors surface here rather than at flush time.

use crate::cascade::{PostRemoveCascade, PreRemoveCascade};
use crate::descriptor::TypeDescriptor;
use crate::error::{FlushError, FlushResult};
use deltaview_model::MAX_TRACKED_SLOTS;
use std::collections::BTreeSet;
use std::sync::Arc;

/// How changes are detected for a view type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Diff against the dirty mask and initial state; flush only what
    /// changed.
    #[default]
    Partial,
    /// Like `Partial`, but flushing is deferred until explicitly requested.
    Lazy,
    /// Treat every updatable attribute as potentially dirty and compare
    /// values to decide.
    Full,
}

/// How changes are written for a view type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushStrategy {
    /// Statement-based when every dirty attribute supports it, otherwise
    /// managed-record-based for that call.
    #[default]
    Auto,
    /// Prefer statement-based flushing. A preference, not a guarantee: one
    /// dirty attribute without statement support forces the whole call to
    /// record mode, because the attributes must be applied atomically in one
    /// record touch.
    Query,
    /// Always flush through an attached managed record.
    Record,
}

/// The shape of one tracked attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// A basic scalar column.
    Basic,
    /// The optimistic-lock version column.
    Version,
    /// An embedded composite flattened into the owner's row.
    Embedded,
    /// A reference to another view, with the foreign key on the owner row.
    Subview,
    /// An unordered collection of elements.
    Collection,
    /// An ordered collection with a positional index column.
    IndexedList,
    /// A keyed collection.
    Map,
    /// A back-reference whose foreign key lives on the child row.
    ParentRef,
}

/// What happens to a related child when it is removed from an inverse
/// relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseRemoveStrategy {
    /// Point the child's back-reference at the new owner.
    Set,
    /// Null the child's back-reference.
    SetNull,
    /// Delete the child.
    Remove,
    /// Leave the child untouched.
    Ignore,
}

/// Configuration of an inverse relationship: the foreign key is owned by the
/// related (child) side.
#[derive(Debug, Clone)]
pub struct InverseMapping {
    /// The child entity.
    pub target_entity: String,
    /// The child column referencing the owner.
    pub back_ref_column: String,
    /// What to do with a removed child.
    pub remove_strategy: InverseRemoveStrategy,
}

/// Registration-time description of one tracked attribute.
#[derive(Debug, Clone)]
pub struct AttributeMapping {
    /// Attribute name, for diagnostics and fetch graphs.
    pub name: String,
    /// View slot index.
    pub slot: usize,
    /// Record column name, or collection path for plural attributes.
    pub column: String,
    /// Attribute shape.
    pub kind: AttributeKind,
    /// Value (or element) type classification.
    pub descriptor: TypeDescriptor,
    /// Map key type classification.
    pub key_descriptor: Option<TypeDescriptor>,
    /// Whether the attribute can be written through the view.
    pub updatable: bool,
    /// Whether changes to this attribute participate in version bumps.
    pub optimistic_lock_protected: bool,
    /// Whether a replaced referenced object is deleted after the flush.
    pub orphan_removal: bool,
    /// Inverse relationship configuration, if the foreign key is on the
    /// other side.
    pub inverse: Option<InverseMapping>,
    /// Nested relation paths that must be fetched before flushing.
    pub fetches: Vec<String>,
    /// Element column name for plural attributes.
    pub element_column: String,
    /// Key column name for map attributes.
    pub key_column: String,
    /// Owner join column name on the collection table.
    pub owner_column: String,
    /// Positional index column name for indexed lists.
    pub index_column: String,
    /// Whether map keys are derived from the element's stored identity.
    pub key_is_element_id: bool,
}

impl AttributeMapping {
    fn new(
        name: impl Into<String>,
        slot: usize,
        column: impl Into<String>,
        kind: AttributeKind,
        descriptor: TypeDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            slot,
            column: column.into(),
            kind,
            descriptor,
            key_descriptor: None,
            updatable: true,
            optimistic_lock_protected: true,
            orphan_removal: false,
            inverse: None,
            fetches: Vec::new(),
            element_column: "element".to_string(),
            key_column: "map_key".to_string(),
            owner_column: "owner_id".to_string(),
            index_column: "idx".to_string(),
            key_is_element_id: false,
        }
    }

    /// A basic scalar attribute.
    #[must_use]
    pub fn basic(name: impl Into<String>, slot: usize, column: impl Into<String>) -> Self {
        Self::new(name, slot, column, AttributeKind::Basic, TypeDescriptor::basic())
    }

    /// The optimistic-lock version attribute.
    #[must_use]
    pub fn version(name: impl Into<String>, slot: usize, column: impl Into<String>) -> Self {
        let mut mapping = Self::new(
            name,
            slot,
            column,
            AttributeKind::Version,
            TypeDescriptor::basic(),
        );
        mapping.updatable = false;
        mapping
    }

    /// An embedded composite attribute.
    #[must_use]
    pub fn embedded(
        name: impl Into<String>,
        slot: usize,
        mapping: Arc<ViewTypeMapping>,
    ) -> Self {
        let name = name.into();
        let descriptor = TypeDescriptor::subview(mapping, false, true);
        Self::new(name.clone(), slot, name, AttributeKind::Embedded, descriptor)
    }

    /// A subview reference attribute with the foreign key on the owner row.
    #[must_use]
    pub fn subview(
        name: impl Into<String>,
        slot: usize,
        column: impl Into<String>,
        mapping: Arc<ViewTypeMapping>,
    ) -> Self {
        let descriptor = TypeDescriptor::subview(mapping, true, true);
        Self::new(name, slot, column, AttributeKind::Subview, descriptor)
    }

    /// An unordered collection attribute; `column` is the collection path.
    #[must_use]
    pub fn collection(
        name: impl Into<String>,
        slot: usize,
        column: impl Into<String>,
        element: TypeDescriptor,
    ) -> Self {
        Self::new(name, slot, column, AttributeKind::Collection, element)
    }

    /// An indexed-list attribute; `column` is the collection path.
    #[must_use]
    pub fn indexed_list(
        name: impl Into<String>,
        slot: usize,
        column: impl Into<String>,
        element: TypeDescriptor,
    ) -> Self {
        Self::new(name, slot, column, AttributeKind::IndexedList, element)
    }

    /// A map attribute; `column` is the collection path.
    #[must_use]
    pub fn map(
        name: impl Into<String>,
        slot: usize,
        column: impl Into<String>,
        key: TypeDescriptor,
        element: TypeDescriptor,
    ) -> Self {
        let mut mapping = Self::new(name, slot, column, AttributeKind::Map, element);
        mapping.key_descriptor = Some(key);
        mapping
    }

    /// A parent back-reference attribute; the foreign key lives on the child
    /// row described by `inverse`.
    #[must_use]
    pub fn parent_ref(
        name: impl Into<String>,
        slot: usize,
        inverse: InverseMapping,
    ) -> Self {
        let descriptor = TypeDescriptor::managed_record(inverse.target_entity.clone());
        let mut mapping = Self::new(name, slot, "", AttributeKind::ParentRef, descriptor);
        mapping.updatable = false;
        mapping.inverse = Some(inverse);
        mapping
    }

    /// Marks the attribute read-only through the view.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.updatable = false;
        self
    }

    /// Excludes the attribute from optimistic-lock version bumps.
    #[must_use]
    pub fn without_optimistic_lock(mut self) -> Self {
        self.optimistic_lock_protected = false;
        self
    }

    /// Enables orphan removal of replaced referenced objects.
    #[must_use]
    pub fn with_orphan_removal(mut self) -> Self {
        self.orphan_removal = true;
        self
    }

    /// Declares an inverse relationship.
    #[must_use]
    pub fn with_inverse(mut self, inverse: InverseMapping) -> Self {
        self.inverse = Some(inverse);
        self
    }

    /// Declares nested fetch paths.
    #[must_use]
    pub fn with_fetches<I, S>(mut self, fetches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetches = fetches.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the element column name for plural attributes.
    #[must_use]
    pub fn with_element_column(mut self, column: impl Into<String>) -> Self {
        self.element_column = column.into();
        self
    }

    /// Overrides the key column name for map attributes.
    #[must_use]
    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = column.into();
        self
    }

    /// Overrides the owner join column name on the collection table.
    #[must_use]
    pub fn with_owner_column(mut self, column: impl Into<String>) -> Self {
        self.owner_column = column.into();
        self
    }

    /// Overrides the positional index column name.
    #[must_use]
    pub fn with_index_column(mut self, column: impl Into<String>) -> Self {
        self.index_column = column.into();
        self
    }

    /// Declares that map keys are the elements' stored identities.
    #[must_use]
    pub fn keyed_by_element_id(mut self) -> Self {
        self.key_is_element_id = true;
        self
    }

    /// Returns whether this attribute is plural.
    #[must_use]
    pub fn is_plural(&self) -> bool {
        matches!(
            self.kind,
            AttributeKind::Collection | AttributeKind::IndexedList | AttributeKind::Map
        )
    }

    /// Returns a diagnostic location string.
    #[must_use]
    pub fn location(&self, view_type: &str) -> String {
        format!("{view_type}.{}", self.name)
    }
}

/// Registration-time description of one view type.
#[derive(Debug, Clone)]
pub struct ViewTypeMapping {
    /// View type name.
    pub name: String,
    /// Backing entity name.
    pub entity: String,
    /// Slot holding the id value, if the type is identifiable.
    pub id_slot: Option<usize>,
    /// The id column name.
    pub id_column: String,
    /// Slot holding the version value, if optimistic-lock protected.
    pub version_slot: Option<usize>,
    /// The version column name.
    pub version_column: Option<String>,
    /// How changes are detected.
    pub flush_mode: FlushMode,
    /// How changes are written.
    pub flush_strategy: FlushStrategy,
    /// The tracked attributes, in slot order.
    pub attributes: Vec<AttributeMapping>,
    /// Unmapped cascades to run before the owning-row delete.
    pub pre_remove_cascades: Vec<PreRemoveCascade>,
    /// Unmapped cascades to run after the owning-row delete.
    pub post_remove_cascades: Vec<PostRemoveCascade>,
}

impl ViewTypeMapping {
    /// Creates an empty mapping for a view type over an entity.
    #[must_use]
    pub fn new(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            id_slot: None,
            id_column: "id".to_string(),
            version_slot: None,
            version_column: None,
            flush_mode: FlushMode::default(),
            flush_strategy: FlushStrategy::default(),
            attributes: Vec::new(),
            pre_remove_cascades: Vec::new(),
            post_remove_cascades: Vec::new(),
        }
    }

    /// Declares the id slot and column.
    #[must_use]
    pub fn with_id(mut self, slot: usize, column: impl Into<String>) -> Self {
        self.id_slot = Some(slot);
        self.id_column = column.into();
        self
    }

    /// Declares the version slot and column.
    #[must_use]
    pub fn with_version(mut self, slot: usize, column: impl Into<String>) -> Self {
        self.version_slot = Some(slot);
        self.version_column = Some(column.into());
        self
    }

    /// Sets the flush mode.
    #[must_use]
    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    /// Sets the flush strategy.
    #[must_use]
    pub fn with_flush_strategy(mut self, strategy: FlushStrategy) -> Self {
        self.flush_strategy = strategy;
        self
    }

    /// Adds a tracked attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds an unmapped pre-remove cascade.
    #[must_use]
    pub fn with_pre_remove_cascade(mut self, cascade: PreRemoveCascade) -> Self {
        self.pre_remove_cascades.push(cascade);
        self
    }

    /// Adds an unmapped post-remove cascade.
    #[must_use]
    pub fn with_post_remove_cascade(mut self, cascade: PostRemoveCascade) -> Self {
        self.post_remove_cascades.push(cascade);
        self
    }

    /// Returns whether the type carries an optimistic-lock version.
    #[must_use]
    pub fn is_optimistic_lock_protected(&self) -> bool {
        self.version_slot.is_some()
    }

    /// Returns whether objects of this type can be newly persisted.
    #[must_use]
    pub fn is_persistable(&self) -> bool {
        self.id_slot.is_some()
    }

    /// Returns the attribute tracked in `slot`, if any.
    #[must_use]
    pub fn attribute_for_slot(&self, slot: usize) -> Option<&AttributeMapping> {
        self.attributes.iter().find(|a| a.slot == slot)
    }

    /// Validates the mapping.
    ///
    /// Checks slot uniqueness and bounds, version shape, and that every
    /// element type can be diffed for the configured strategy.
    pub fn validate(&self) -> FlushResult<()> {
        let mut seen = BTreeSet::new();
        for attribute in &self.attributes {
            if attribute.slot >= MAX_TRACKED_SLOTS {
                return Err(FlushError::configuration(format!(
                    "attribute {}: slot {} exceeds the maximum of {}",
                    attribute.location(&self.name),
                    attribute.slot,
                    MAX_TRACKED_SLOTS
                )));
            }
            if !seen.insert(attribute.slot) {
                return Err(FlushError::configuration(format!(
                    "attribute {}: slot {} is already tracked",
                    attribute.location(&self.name),
                    attribute.slot
                )));
            }
            if attribute.kind == AttributeKind::Version
                && self.version_slot != Some(attribute.slot)
            {
                return Err(FlushError::configuration(format!(
                    "attribute {}: version attribute must occupy the declared \
                     version slot",
                    attribute.location(&self.name)
                )));
            }
            if attribute.is_plural() {
                attribute
                    .descriptor
                    .validate_element_for_query_flush(&attribute.location(&self.name))?;
            }
            if attribute.kind == AttributeKind::Map && attribute.key_descriptor.is_none() {
                return Err(FlushError::configuration(format!(
                    "attribute {}: map attribute needs a key descriptor",
                    attribute.location(&self.name)
                )));
            }
            if attribute.kind == AttributeKind::ParentRef && attribute.inverse.is_none() {
                return Err(FlushError::configuration(format!(
                    "attribute {}: parent reference needs an inverse mapping",
                    attribute.location(&self.name)
                )));
            }
        }
        if let Some(version_slot) = self.version_slot {
            if !seen.contains(&version_slot) {
                return Err(FlushError::configuration(format!(
                    "view type {}: version slot {version_slot} is not tracked",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_slots_are_rejected() {
        let mapping = ViewTypeMapping::new("PostView", "posts")
            .with_attribute(AttributeMapping::basic("title", 0, "title"))
            .with_attribute(AttributeMapping::basic("body", 0, "body"));
        assert!(matches!(
            mapping.validate(),
            Err(FlushError::Configuration { .. })
        ));
    }

    #[test]
    fn version_slot_must_be_tracked() {
        let mapping = ViewTypeMapping::new("PostView", "posts")
            .with_version(3, "version")
            .with_attribute(AttributeMapping::basic("title", 0, "title"));
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn valid_mapping_passes() {
        let mapping = ViewTypeMapping::new("PostView", "posts")
            .with_id(0, "id")
            .with_version(1, "version")
            .with_attribute(AttributeMapping::basic("id", 0, "id").read_only())
            .with_attribute(AttributeMapping::version("version", 1, "version"))
            .with_attribute(AttributeMapping::basic("title", 2, "title"));
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn map_without_key_descriptor_is_rejected() {
        let mut attribute = AttributeMapping::map(
            "tags",
            0,
            "tags",
            TypeDescriptor::basic(),
            TypeDescriptor::basic(),
        );
        attribute.key_descriptor = None;
        let mapping = ViewTypeMapping::new("PostView", "posts").with_attribute(attribute);
        assert!(mapping.validate().is_err());
    }
}
