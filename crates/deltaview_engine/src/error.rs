//! Error types for the DeltaView flush engine.

use crate::session::SessionError;
use deltaview_model::ModelError;
use thiserror::Error;

/// Result type for flush operations.
pub type FlushResult<T> = Result<T, FlushError>;

/// Errors that can occur while reconciling a view graph with the store.
#[derive(Debug, Error)]
pub enum FlushError {
    /// A statement expected to affect exactly one row affected zero rows, or
    /// a version value read from a managed record disagrees with the view's
    /// in-memory version. Never retried internally.
    #[error("optimistic lock conflict on {entity}: {detail}")]
    OptimisticLock {
        /// The entity whose row conflicted.
        entity: String,
        /// Description of the conflict.
        detail: String,
    },

    /// A descriptor or flusher was asked to support a shape its static
    /// configuration cannot. Raised at registration time, before any
    /// statements are issued.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An operation was called on the wrong flusher variant. This indicates
    /// a caller-side orchestration bug, not a runtime data condition.
    #[error("unsupported operation: {message}")]
    Unsupported {
        /// Description of the unsupported call.
        message: String,
    },

    /// Model-layer error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Store-session error, propagated unchanged.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl FlushError {
    /// Creates an optimistic-lock conflict error.
    pub fn optimistic_lock(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::OptimisticLock {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}
