//! Composite attribute flusher.
//!
//! Aggregates all attribute flushers of one view type into a single flush
//! unit: decides per call whether to use statement-based or managed-record
//! execution, sequences persist/update/delete, manages optimistic-lock
//! version bumps, and computes a reduced "only what's dirty" flusher on
//! demand.

use crate::cascade::DeletePlan;
use crate::context::{FlushContext, PostFlushAction};
use crate::error::{FlushError, FlushResult};
use crate::fetch_graph::FetchGraphNode;
use crate::flusher::{
    AttributeFlusher, BasicAttributeFlusher, CollectionAttributeFlusher,
    EmbeddableAttributeFlusher, IndexedListAttributeFlusher, MapAttributeFlusher,
    ParentRefAttributeFlusher, SubviewAttributeFlusher, VersionAttributeFlusher,
};
use crate::mapping::{AttributeKind, FlushMode, FlushStrategy, ViewTypeMapping};
use crate::session::{Statement, StatementKind};
use crate::statement::StatementBuilder;
use deltaview_model::{AttributeValue, Record, ScalarValue, ViewRef};
use std::sync::Arc;
use tracing::debug;

/// The flush unit for one view type.
///
/// The full template is immutable and shared; per-call dirty instances are
/// freshly constructed and never flush more than the attributes they were
/// told are dirty.
#[derive(Debug, Clone)]
pub struct CompositeAttributeFlusher {
    mapping: Arc<ViewTypeMapping>,
    flushers: Vec<Option<AttributeFlusher>>,
    version: Option<VersionAttributeFlusher>,
    persistable: bool,
    full: bool,
}

impl CompositeAttributeFlusher {
    /// Builds the full flusher template for a view type.
    ///
    /// Configuration errors surface here, before any flush runs.
    pub fn for_mapping(mapping: &Arc<ViewTypeMapping>) -> FlushResult<Self> {
        mapping.validate()?;
        let mut flushers = Vec::new();
        let mut version = None;
        for attribute in &mapping.attributes {
            match attribute.kind {
                AttributeKind::Version => {
                    version = Some(VersionAttributeFlusher::new(attribute));
                }
                AttributeKind::Basic => {
                    flushers.push(Some(AttributeFlusher::Basic(BasicAttributeFlusher::new(
                        attribute,
                    ))));
                }
                AttributeKind::Embedded => {
                    flushers.push(Some(AttributeFlusher::Embeddable(
                        EmbeddableAttributeFlusher::new(attribute)?,
                    )));
                }
                AttributeKind::Subview => {
                    flushers.push(Some(AttributeFlusher::Subview(
                        SubviewAttributeFlusher::new(attribute)?,
                    )));
                }
                AttributeKind::Collection => {
                    flushers.push(Some(AttributeFlusher::Collection(
                        CollectionAttributeFlusher::new(attribute, &mapping.entity),
                    )));
                }
                AttributeKind::IndexedList => {
                    flushers.push(Some(AttributeFlusher::IndexedList(
                        IndexedListAttributeFlusher::new(attribute, &mapping.entity),
                    )));
                }
                AttributeKind::Map => {
                    flushers.push(Some(AttributeFlusher::Map(MapAttributeFlusher::new(
                        attribute,
                        &mapping.entity,
                    ))));
                }
                AttributeKind::ParentRef => {
                    flushers.push(Some(AttributeFlusher::ParentRef(
                        ParentRefAttributeFlusher::new(attribute)?,
                    )));
                }
            }
        }
        Ok(Self {
            persistable: mapping.is_persistable(),
            mapping: Arc::clone(mapping),
            flushers,
            version,
            full: true,
        })
    }

    /// Returns the view type mapping.
    #[must_use]
    pub fn mapping(&self) -> &Arc<ViewTypeMapping> {
        &self.mapping
    }

    /// Returns whether the type carries an optimistic-lock version.
    #[must_use]
    pub fn is_optimistic_lock_protected(&self) -> bool {
        self.version.is_some()
    }

    /// Returns whether a version flusher is configured.
    #[must_use]
    pub fn has_version_flusher(&self) -> bool {
        self.version.is_some()
    }

    /// Returns whether every attribute of this flush unit can be expressed
    /// as statement fragments.
    #[must_use]
    pub fn supports_query_flush(&self) -> bool {
        self.flushers
            .iter()
            .flatten()
            .all(AttributeFlusher::supports_query_flush)
    }

    /// Merges the fetch graphs of every attribute into one root node.
    pub fn fetch_graph(&self) -> FlushResult<FetchGraphNode> {
        let mut root = FetchGraphNode::new("");
        for flusher in self.flushers.iter().flatten() {
            if let Some(node) = flusher.fetch_graph() {
                root = root.child(node);
            }
        }
        Ok(root)
    }

    /// Checks that the graph loaded for a view covers what this flush unit
    /// touches.
    ///
    /// The caller loads the merged superset graph up front; a flush requires
    /// that graph to cover the relations of every attribute it may touch.
    pub fn verify_loaded_graph(&self, loaded: &FetchGraphNode) -> FlushResult<()> {
        let required = self.fetch_graph()?;
        if !loaded.is_superset_of(&required) {
            return Err(FlushError::configuration(format!(
                "view type {}: loaded fetch graph does not cover the flushed \
                 relations",
                self.mapping.name
            )));
        }
        Ok(())
    }

    /// Computes the reduced flusher covering exactly the dirty attributes.
    ///
    /// Returns `None` when there is nothing to flush. For any view whose
    /// current state equals its initial state, that is always the result.
    pub fn dirty_flusher(&self, view: &ViewRef) -> FlushResult<Option<CompositeAttributeFlusher>> {
        let guard = view.read();
        if guard.is_new() {
            let mut dirty = self.clone();
            dirty.full = false;
            return Ok(Some(dirty));
        }
        let full_compare =
            !guard.has_initial_state() || self.mapping.flush_mode == FlushMode::Full;
        let mut dirty_flushers: Vec<Option<AttributeFlusher>> = vec![None; self.flushers.len()];
        let mut any = false;
        for (index, flusher) in self.flushers.iter().enumerate() {
            let Some(flusher) = flusher else { continue };
            let slot = flusher.slot();
            if !full_compare && !guard.is_dirty(slot) {
                continue;
            }
            let current = guard.get(slot)?;
            let initial = guard.initial(slot);
            if let Some(dirty) = flusher.dirty_flusher(initial, current)? {
                dirty_flushers[index] = Some(dirty);
                any = true;
            }
        }
        drop(guard);
        if !any {
            return Ok(None);
        }
        Ok(Some(Self {
            mapping: Arc::clone(&self.mapping),
            flushers: dirty_flushers,
            version: self.version.clone(),
            persistable: self.persistable,
            full: false,
        }))
    }

    fn view_id(&self, view: &ViewRef) -> FlushResult<ScalarValue> {
        view.read().id().cloned().ok_or_else(|| {
            FlushError::unsupported(format!(
                "view of type {} has no id to flush against",
                self.mapping.name
            ))
        })
    }

    fn use_query_flush(&self) -> bool {
        self.mapping.flush_strategy != FlushStrategy::Record && self.supports_query_flush()
    }

    /// Flushes a view object's changes into the store.
    ///
    /// Returns whether anything changed.
    pub fn flush(&self, ctx: &mut FlushContext<'_>, view: &ViewRef) -> FlushResult<bool> {
        let is_new = view.read().is_new();
        if is_new {
            if !self.persistable {
                return Err(FlushError::unsupported(format!(
                    "view type {} is not persistable",
                    self.mapping.name
                )));
            }
            debug!(view_type = %self.mapping.name, "persisting new view");
            self.persist_new(ctx, view)?;
            self.run_post_flush(ctx)?;
            return Ok(true);
        }

        let dirty_owned;
        let dirty: &CompositeAttributeFlusher = if self.full {
            match self.dirty_flusher(view)? {
                Some(dirty) => {
                    dirty_owned = dirty;
                    &dirty_owned
                }
                None => return Ok(false),
            }
        } else {
            self
        };

        let changed = if dirty.use_query_flush() {
            debug!(view_type = %self.mapping.name, strategy = "query", "flushing view");
            dirty.flush_with_statements(ctx, view)?
        } else {
            // A single attribute without statement support forces the whole
            // composite into record mode for this call; the attributes must
            // be applied atomically in one record touch.
            debug!(view_type = %self.mapping.name, strategy = "record", "flushing view");
            dirty.flush_through_record(ctx, view)?
        };

        // Even a flush that collapsed to a no-op leaves the view consistent
        // with the store, so the dirty state is reset either way.
        view.write().mark_clean();
        self.run_post_flush(ctx)?;
        Ok(changed)
    }

    /// Persist path: populate a fresh managed record from every attribute
    /// and attach it; the store assigns the id.
    fn persist_new(&self, ctx: &mut FlushContext<'_>, view: &ViewRef) -> FlushResult<()> {
        let record = Record::new(self.mapping.entity.clone()).wrap();
        if let Some(id) = view.read().id().cloned() {
            record.write().set_id(id.clone());
            record
                .write()
                .set(self.mapping.id_column.clone(), AttributeValue::Scalar(id));
        }
        for flusher in self.flushers.iter().flatten() {
            let current = {
                let guard = view.read();
                guard.get(flusher.slot())?.clone()
            };
            // A persist is an update from nothing: scoping each flusher to
            // that diff makes references and embedded columns write
            // themselves out in full.
            let Some(persist_flusher) = flusher.dirty_flusher(None, &current)? else {
                continue;
            };
            persist_flusher.flush_record(ctx, &record, view, &current)?;
        }
        if let Some(column) = &self.mapping.version_column {
            record.write().set(
                column.clone(),
                AttributeValue::Scalar(VersionAttributeFlusher::initial_value()),
            );
        }
        ctx.session().persist(&record)?;
        let assigned = record.read().id().cloned().ok_or_else(|| {
            FlushError::unsupported(format!(
                "store did not assign an id while persisting {}",
                self.mapping.entity
            ))
        })?;
        record.write().set(
            self.mapping.id_column.clone(),
            AttributeValue::Scalar(assigned.clone()),
        );
        let mut guard = view.write();
        guard.set_id(assigned.clone());
        if let Some(id_slot) = self.mapping.id_slot {
            guard.set_untracked(id_slot, AttributeValue::Scalar(assigned))?;
        }
        if let Some(version_slot) = self.mapping.version_slot {
            guard.set_untracked(
                version_slot,
                AttributeValue::Scalar(VersionAttributeFlusher::initial_value()),
            )?;
        }
        guard.mark_persisted();
        guard.mark_clean();
        Ok(())
    }

    /// Statement-based execution: one owner update carrying every singular
    /// fragment, collection statements issued directly, version last.
    fn flush_with_statements(
        &self,
        ctx: &mut FlushContext<'_>,
        view: &ViewRef,
    ) -> FlushResult<bool> {
        let id = self.view_id(view)?;
        let mut statement = StatementBuilder::update(&self.mapping.entity)
            .where_eq(&self.mapping.id_column, id.clone())
            .build();
        let mut changed = false;
        for flusher in self.flushers.iter().flatten() {
            if flusher.is_passthrough() {
                continue;
            }
            let current = {
                let guard = view.read();
                guard.get(flusher.slot())?.clone()
            };
            changed |= flusher.flush_query(ctx, view, Some(&mut statement), &current)?;
        }
        // The version fragment executes last, and only when a lock-protected
        // attribute was dirty.
        let bump_version = changed
            && self
                .flushers
                .iter()
                .flatten()
                .any(AttributeFlusher::is_optimistic_lock_protected);
        let version_next = match (&self.version, bump_version) {
            (Some(version), true) => Some((version, version.flush_query(view, &mut statement)?)),
            _ => None,
        };
        if !statement.is_empty_update() {
            let rows = ctx.session().execute(&statement)?;
            if rows == 0 {
                return Err(FlushError::optimistic_lock(
                    &self.mapping.entity,
                    format!("update of row {id} affected zero rows"),
                ));
            }
        }
        if let Some((version, next)) = version_next {
            version.write_back(view, next)?;
        }
        Ok(changed)
    }

    /// Managed-record execution: load the record, apply every dirty
    /// attribute, bump the version when anything actually changed.
    fn flush_through_record(
        &self,
        ctx: &mut FlushContext<'_>,
        view: &ViewRef,
    ) -> FlushResult<bool> {
        let id = self.view_id(view)?;
        let record = ctx
            .session()
            .load(&self.mapping.entity, &id)?
            .ok_or_else(|| {
                FlushError::optimistic_lock(
                    &self.mapping.entity,
                    format!("row {id} no longer exists"),
                )
            })?;
        let mut changed = false;
        for flusher in self.flushers.iter().flatten() {
            let current = {
                let guard = view.read();
                guard.get(flusher.slot())?.clone()
            };
            changed |= flusher.flush_record(ctx, &record, view, &current)?;
        }
        let bump_version = changed
            && self
                .flushers
                .iter()
                .flatten()
                .any(AttributeFlusher::is_optimistic_lock_protected);
        if bump_version {
            if let Some(version) = &self.version {
                version.flush_record(&record, view)?;
            }
        }
        Ok(changed)
    }

    /// Deletion path: pre-order cascades, the owning-row delete with its
    /// unmapped cascades, then post-order cascades.
    pub fn remove(&self, ctx: &mut FlushContext<'_>, view: &ViewRef) -> FlushResult<()> {
        let id = self.view_id(view)?;
        let version_value = {
            let guard = view.read();
            match self.mapping.version_slot {
                Some(slot) => match guard.get(slot)? {
                    AttributeValue::Scalar(scalar) => Some(scalar.clone()),
                    _ => None,
                },
                None => None,
            }
        };
        debug!(view_type = %self.mapping.name, %id, "removing view");

        for flusher in self.flushers.iter().flatten() {
            if flusher.requires_delete_cascade_after_remove() {
                continue;
            }
            let current = {
                let guard = view.read();
                guard.get(flusher.slot())?.clone()
            };
            flusher.remove(ctx, &id, &current)?;
        }

        let mut plan = DeletePlan::new(
            &self.mapping.entity,
            &self.mapping.id_column,
            &id,
            &self.mapping.pre_remove_cascades,
            &self.mapping.post_remove_cascades,
        );
        if let (Some(column), Some(version)) =
            (self.mapping.version_column.as_deref(), version_value.as_ref())
        {
            plan = plan.with_version(column, version);
        }
        plan.execute(ctx)?;

        for flusher in self.flushers.iter().flatten() {
            if !flusher.requires_delete_cascade_after_remove() {
                continue;
            }
            let current = {
                let guard = view.read();
                guard.get(flusher.slot())?.clone()
            };
            flusher.remove(ctx, &id, &current)?;
        }
        self.run_post_flush(ctx)?;
        Ok(())
    }

    /// Drains queued post-flush work: orphan removals run only after the
    /// primary statements are through.
    fn run_post_flush(&self, ctx: &mut FlushContext<'_>) -> FlushResult<()> {
        loop {
            let actions = ctx.take_post_flush();
            if actions.is_empty() {
                return Ok(());
            }
            for action in actions {
                match action {
                    PostFlushAction::DeleteById { entity, id } => {
                        let statement = Statement {
                            kind: StatementKind::Delete,
                            entity: entity.clone(),
                            collection_path: None,
                            assignments: Vec::new(),
                            index_shift: None,
                            position: None,
                            predicates: vec![crate::session::Predicate::Eq {
                                path: "id".into(),
                                value: id,
                            }],
                            returning: Vec::new(),
                        };
                        ctx.session().execute(&statement)?;
                    }
                    PostFlushAction::DeleteView { mapping, view } => {
                        let composite = CompositeAttributeFlusher::for_mapping(&mapping)?;
                        composite.remove(ctx, &view)?;
                    }
                }
            }
        }
    }
}
