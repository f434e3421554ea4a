//! Unmapped-relation cascade deletion.
//!
//! Some related data is not part of the object model and the store does not
//! manage it declaratively. Deleting an owning row then needs explicit
//! pre/post ordering: rows referencing the owner must be detached or deleted
//! before the owner row goes away, while rows the owner references can only
//! be deleted afterwards — and their keys must be captured from the deleted
//! row itself.
//!
//! The two-phase [`DeletePlan`] makes the store-capability branch a pure
//! strategy swap: gather the returned values (natively, or through a
//! fallback select), then delete, then run the post-deletes.

use crate::context::FlushContext;
use crate::error::{FlushError, FlushResult};
use crate::statement::StatementBuilder;
use deltaview_model::ScalarValue;
use tracing::debug;

/// What a pre-remove cascade does to rows referencing the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    /// Null the referencing column.
    SetNull,
    /// Delete the referencing rows.
    Delete,
}

/// A cascade over rows that reference the owner and would otherwise violate
/// a constraint when the owner row is deleted. Runs before the owning-row
/// delete.
#[derive(Debug, Clone)]
pub struct PreRemoveCascade {
    /// The referencing entity.
    pub entity: String,
    /// The column on that entity referencing the owner.
    pub reference_column: String,
    /// What to do with the referencing rows.
    pub action: CascadeAction,
}

/// A cascade over a row the owner references. The referenced key is captured
/// from the deleted owner row; the delete runs after the owning-row delete.
#[derive(Debug, Clone)]
pub struct PostRemoveCascade {
    /// The referenced entity.
    pub entity: String,
    /// The id column on the referenced entity.
    pub id_column: String,
    /// The owner column holding the referenced key.
    pub owner_column: String,
}

/// A two-phase plan for deleting one owning row with its unmapped cascades.
#[derive(Debug)]
pub struct DeletePlan<'a> {
    entity: &'a str,
    id_column: &'a str,
    owner_id: &'a ScalarValue,
    version_column: Option<&'a str>,
    expected_version: Option<&'a ScalarValue>,
    pre: &'a [PreRemoveCascade],
    post: &'a [PostRemoveCascade],
}

impl<'a> DeletePlan<'a> {
    /// Creates a plan for deleting `owner_id` from `entity`.
    #[must_use]
    pub fn new(
        entity: &'a str,
        id_column: &'a str,
        owner_id: &'a ScalarValue,
        pre: &'a [PreRemoveCascade],
        post: &'a [PostRemoveCascade],
    ) -> Self {
        Self {
            entity,
            id_column,
            owner_id,
            version_column: None,
            expected_version: None,
            pre,
            post,
        }
    }

    /// Adds an optimistic-lock version predicate to the owning-row delete.
    #[must_use]
    pub fn with_version(
        mut self,
        version_column: &'a str,
        expected_version: &'a ScalarValue,
    ) -> Self {
        self.version_column = Some(version_column);
        self.expected_version = Some(expected_version);
        self
    }

    /// Executes the plan: pre-deletes, the owning-row delete (capturing
    /// returned values natively or through a fallback select), then
    /// post-deletes consuming the captured values.
    pub fn execute(&self, ctx: &mut FlushContext<'_>) -> FlushResult<()> {
        for cascade in self.pre {
            let statement = match cascade.action {
                CascadeAction::SetNull => StatementBuilder::update(&cascade.entity)
                    .set_null(&cascade.reference_column)
                    .where_eq(&cascade.reference_column, self.owner_id.clone())
                    .build(),
                CascadeAction::Delete => StatementBuilder::delete(&cascade.entity)
                    .where_eq(&cascade.reference_column, self.owner_id.clone())
                    .build(),
            };
            ctx.session().execute(&statement)?;
        }

        let returned = self.delete_owner_row(ctx)?;

        for (cascade, value) in self.post.iter().zip(returned) {
            if value.is_null() {
                continue;
            }
            let statement = StatementBuilder::delete(&cascade.entity)
                .where_eq(&cascade.id_column, value)
                .build();
            ctx.session().execute(&statement)?;
        }
        Ok(())
    }

    /// Deletes the owning row, returning the post-cascade key values in
    /// post-cascade order.
    fn delete_owner_row(&self, ctx: &mut FlushContext<'_>) -> FlushResult<Vec<ScalarValue>> {
        let returning: Vec<String> = self
            .post
            .iter()
            .map(|cascade| cascade.owner_column.clone())
            .collect();

        let mut delete = StatementBuilder::delete(self.entity)
            .where_eq(self.id_column, self.owner_id.clone());
        if let (Some(column), Some(version)) = (self.version_column, self.expected_version) {
            delete = delete.where_eq(column, version.clone());
        }

        if returning.is_empty() {
            let statement = delete.build();
            let rows = ctx.session().execute(&statement)?;
            if rows == 0 {
                return Err(self.conflict());
            }
            return Ok(Vec::new());
        }

        if ctx.supports_returning() {
            debug!(entity = self.entity, "deleting with returned columns");
            let statement = delete.returning(returning).build();
            let mut rows = ctx.session().execute_returning(&statement)?;
            return match rows.pop() {
                Some(row) => Ok(row),
                None => Err(self.conflict()),
            };
        }

        // The store cannot return deleted values; select them first.
        debug!(entity = self.entity, "selecting cascade keys before delete");
        let select = StatementBuilder::select(self.entity)
            .where_eq(self.id_column, self.owner_id.clone())
            .returning(returning)
            .build();
        let mut rows = ctx.session().execute_returning(&select)?;
        let row = rows.pop().ok_or_else(|| self.conflict())?;

        let statement = delete.build();
        if ctx.session().execute(&statement)? == 0 {
            return Err(self.conflict());
        }
        Ok(row)
    }

    fn conflict(&self) -> FlushError {
        FlushError::optimistic_lock(
            self.entity,
            format!("row {} was concurrently deleted or modified", self.owner_id),
        )
    }
}
