//! Flush context.
//!
//! One context drives one composite flush to completion on the calling
//! thread. It borrows the store session for the duration of the flush and
//! queues work that must run after the primary statements — orphan removals
//! of replaced references, most notably — so that deletes never run before
//! the new reference is safely written.

use crate::mapping::ViewTypeMapping;
use crate::session::StoreSession;
use deltaview_model::{ScalarValue, ViewRef};
use std::sync::Arc;

/// Deferred work executed after the primary flush statements.
#[derive(Clone)]
pub enum PostFlushAction {
    /// Remove a view object and its cascades.
    DeleteView {
        /// The view's type mapping.
        mapping: Arc<ViewTypeMapping>,
        /// The view to remove.
        view: ViewRef,
    },
    /// Delete one row by id.
    DeleteById {
        /// The entity.
        entity: String,
        /// The row id.
        id: ScalarValue,
    },
}

/// Per-call flush state.
pub struct FlushContext<'a> {
    session: &'a mut dyn StoreSession,
    post_flush: Vec<PostFlushAction>,
}

impl<'a> FlushContext<'a> {
    /// Creates a context borrowing the session for one flush.
    pub fn new(session: &'a mut dyn StoreSession) -> Self {
        Self {
            session,
            post_flush: Vec::new(),
        }
    }

    /// Returns the session.
    pub fn session(&mut self) -> &mut dyn StoreSession {
        self.session
    }

    /// Returns whether the store can return column values from deletes.
    #[must_use]
    pub fn supports_returning(&self) -> bool {
        self.session.supports_returning()
    }

    /// Queues a post-flush action.
    pub fn enqueue_post_flush(&mut self, action: PostFlushAction) {
        self.post_flush.push(action);
    }

    /// Takes the queued post-flush actions, leaving the queue empty.
    #[must_use]
    pub fn take_post_flush(&mut self) -> Vec<PostFlushAction> {
        std::mem::take(&mut self.post_flush)
    }

    /// Returns whether post-flush work is queued.
    #[must_use]
    pub fn has_post_flush(&self) -> bool {
        !self.post_flush.is_empty()
    }
}
