//! Inverse relationship flushing.
//!
//! When the foreign key is owned by the related (child) side, nothing is
//! emitted on the parent row; the child-side update or removal is computed
//! here instead.

use crate::context::FlushContext;
use crate::error::{FlushError, FlushResult};
use crate::mapping::{InverseMapping, InverseRemoveStrategy};
use crate::statement::StatementBuilder;
use deltaview_model::{AttributeValue, RecordRef, ScalarValue};

/// Computes child-side updates for a relationship whose foreign key lives on
/// the child row.
#[derive(Debug, Clone)]
pub struct InverseFlusher {
    target_entity: String,
    back_ref_column: String,
    remove_strategy: InverseRemoveStrategy,
}

impl InverseFlusher {
    /// Creates a flusher from an inverse mapping.
    #[must_use]
    pub fn from_mapping(mapping: &InverseMapping) -> Self {
        Self {
            target_entity: mapping.target_entity.clone(),
            back_ref_column: mapping.back_ref_column.clone(),
            remove_strategy: mapping.remove_strategy,
        }
    }

    /// Returns the child entity.
    #[must_use]
    pub fn target_entity(&self) -> &str {
        &self.target_entity
    }

    /// Returns the configured removal strategy.
    #[must_use]
    pub fn remove_strategy(&self) -> InverseRemoveStrategy {
        self.remove_strategy
    }

    /// Points a child's back-reference at an owner with a direct statement.
    pub fn flush_query_set_owner(
        &self,
        ctx: &mut FlushContext<'_>,
        child_id: &ScalarValue,
        owner_id: Option<&ScalarValue>,
    ) -> FlushResult<()> {
        let owner_value = owner_id.cloned().unwrap_or(ScalarValue::Null);
        let statement = StatementBuilder::update(&self.target_entity)
            .set(&self.back_ref_column, owner_value)
            .where_eq("id", child_id.clone())
            .build();
        let rows = ctx.session().execute(&statement)?;
        if rows == 0 {
            return Err(FlushError::optimistic_lock(
                &self.target_entity,
                format!("expected child row {child_id} to exist for back-reference update"),
            ));
        }
        Ok(())
    }

    /// Points a child's back-reference at an owner on the managed record.
    ///
    /// Returns whether the record actually changed.
    pub fn flush_record_set_owner(
        &self,
        child_record: &RecordRef,
        owner_id: Option<&ScalarValue>,
    ) -> bool {
        let owner_value = owner_id.cloned().unwrap_or(ScalarValue::Null);
        child_record.write().set(
            self.back_ref_column.clone(),
            AttributeValue::Scalar(owner_value),
        )
    }

    /// Handles removal of a child from the relationship according to the
    /// configured strategy.
    ///
    /// `new_owner_id` is the replacement owner for the
    /// [`InverseRemoveStrategy::Set`] strategy.
    pub fn remove_element(
        &self,
        ctx: &mut FlushContext<'_>,
        child_id: &ScalarValue,
        new_owner_id: Option<&ScalarValue>,
    ) -> FlushResult<()> {
        match self.remove_strategy {
            InverseRemoveStrategy::Set => {
                let new_owner = new_owner_id.ok_or_else(|| {
                    FlushError::unsupported(
                        "inverse remove strategy SET requires a replacement owner",
                    )
                })?;
                self.flush_query_set_owner(ctx, child_id, Some(new_owner))
            }
            InverseRemoveStrategy::SetNull => {
                self.flush_query_set_owner(ctx, child_id, None)
            }
            InverseRemoveStrategy::Remove => {
                let statement = StatementBuilder::delete(&self.target_entity)
                    .where_eq("id", child_id.clone())
                    .build();
                ctx.session().execute(&statement)?;
                Ok(())
            }
            InverseRemoveStrategy::Ignore => Ok(()),
        }
    }

    /// Detaches or deletes every child referencing `owner_id`, used before
    /// an owner-row delete.
    pub fn remove_by_owner_id(
        &self,
        ctx: &mut FlushContext<'_>,
        owner_id: &ScalarValue,
    ) -> FlushResult<()> {
        let statement = match self.remove_strategy {
            InverseRemoveStrategy::SetNull | InverseRemoveStrategy::Set => {
                StatementBuilder::update(&self.target_entity)
                    .set_null(&self.back_ref_column)
                    .where_eq(&self.back_ref_column, owner_id.clone())
                    .build()
            }
            InverseRemoveStrategy::Remove => StatementBuilder::delete(&self.target_entity)
                .where_eq(&self.back_ref_column, owner_id.clone())
                .build(),
            InverseRemoveStrategy::Ignore => return Ok(()),
        };
        ctx.session().execute(&statement)?;
        Ok(())
    }
}
