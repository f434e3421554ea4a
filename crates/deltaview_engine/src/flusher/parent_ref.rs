//! Parent/inverse reference flusher.

use crate::context::FlushContext;
use crate::error::{FlushError, FlushResult};
use crate::inverse::InverseFlusher;
use crate::mapping::AttributeMapping;
use deltaview_model::ScalarValue;

/// Flusher for a back-reference whose foreign key lives on the child row.
///
/// Never itself the target of a direct update on the parent side — the
/// child-side statements are driven through the inverse flusher. Calling a
/// flush operation on it is a caller-side orchestration bug.
#[derive(Debug, Clone)]
pub struct ParentRefAttributeFlusher {
    name: String,
    slot: usize,
    inverse: InverseFlusher,
    fetches: Vec<String>,
}

impl ParentRefAttributeFlusher {
    /// Builds the flusher from an attribute mapping.
    pub fn new(mapping: &AttributeMapping) -> FlushResult<Self> {
        let inverse = mapping.inverse.as_ref().ok_or_else(|| {
            FlushError::configuration(format!(
                "attribute {}: parent reference needs an inverse mapping",
                mapping.name
            ))
        })?;
        Ok(Self {
            name: mapping.name.clone(),
            slot: mapping.slot,
            inverse: InverseFlusher::from_mapping(inverse),
            fetches: mapping.fetches.clone(),
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

    /// Rejects a flush operation that must never reach this variant.
    pub fn reject<T>(&self, operation: &str) -> FlushResult<T> {
        Err(FlushError::unsupported(format!(
            "operation {operation} is not applicable to parent reference {}",
            self.name
        )))
    }

    /// Cascade-delete hook: children referencing the owner are detached or
    /// deleted before the owning row goes away.
    pub fn remove(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
    ) -> FlushResult<()> {
        self.inverse.remove_by_owner_id(ctx, owner_id)
    }
}
