//! View updaters and the updater registry.
//!
//! A view updater is the entry point a caller obtains for one view type: it
//! owns the cached full composite flusher template and drives a flush or
//! removal against a session. Templates are immutable and safely shared
//! across threads; per-call state never is.

use crate::context::FlushContext;
use crate::error::FlushResult;
use crate::flusher::CompositeAttributeFlusher;
use crate::mapping::ViewTypeMapping;
use crate::session::StoreSession;
use deltaview_model::ViewRef;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Flush entry point for one registered view type.
#[derive(Debug)]
pub struct ViewUpdater {
    mapping: Arc<ViewTypeMapping>,
    template: CompositeAttributeFlusher,
}

impl ViewUpdater {
    /// Builds the updater, constructing and validating the full flusher
    /// template.
    pub fn new(mapping: Arc<ViewTypeMapping>) -> FlushResult<Self> {
        let template = CompositeAttributeFlusher::for_mapping(&mapping)?;
        Ok(Self { mapping, template })
    }

    /// Returns the view type mapping.
    #[must_use]
    pub fn mapping(&self) -> &Arc<ViewTypeMapping> {
        &self.mapping
    }

    /// Returns the cached full flusher template.
    #[must_use]
    pub fn full_flusher(&self) -> &CompositeAttributeFlusher {
        &self.template
    }

    /// Computes the reduced flusher for a view's current diff.
    pub fn dirty_flusher(
        &self,
        view: &ViewRef,
    ) -> FlushResult<Option<CompositeAttributeFlusher>> {
        self.template.dirty_flusher(view)
    }

    /// Reconciles a view object's changes into the store.
    ///
    /// Returns whether anything changed.
    pub fn flush(&self, session: &mut dyn StoreSession, view: &ViewRef) -> FlushResult<bool> {
        let mut ctx = FlushContext::new(session);
        self.template.flush(&mut ctx, view)
    }

    /// Removes a view object from the store, cascading as configured.
    pub fn remove(&self, session: &mut dyn StoreSession, view: &ViewRef) -> FlushResult<()> {
        let mut ctx = FlushContext::new(session);
        self.template.remove(&mut ctx, view)
    }
}

/// Registry of view updaters, keyed by view type name.
#[derive(Debug, Default)]
pub struct UpdaterRegistry {
    updaters: RwLock<HashMap<String, Arc<ViewUpdater>>>,
}

impl UpdaterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a view type, building its flusher template.
    ///
    /// Registering the same name again replaces the previous updater.
    pub fn register(&self, mapping: ViewTypeMapping) -> FlushResult<Arc<ViewUpdater>> {
        let name = mapping.name.clone();
        let updater = Arc::new(ViewUpdater::new(Arc::new(mapping))?);
        debug!(view_type = %name, "registered view updater");
        self.updaters.write().insert(name, Arc::clone(&updater));
        Ok(updater)
    }

    /// Returns the updater for a view type name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ViewUpdater>> {
        self.updaters.read().get(name).cloned()
    }

    /// Returns the number of registered view types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.updaters.read().len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updaters.read().is_empty()
    }
}
