//! Error types for the DeltaView model layer.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in model-layer operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A slot index is outside the view object's state array.
    #[error("slot {slot} out of range for view with {len} slots")]
    SlotOutOfRange {
        /// The requested slot.
        slot: usize,
        /// The number of slots the view has.
        len: usize,
    },

    /// A slot or field held a value of an unexpected shape.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected value shape.
        expected: &'static str,
        /// The actual value shape.
        actual: &'static str,
    },

    /// A view type declares more tracked attributes than the dirty mask holds.
    #[error("too many tracked slots: {count} exceeds the maximum of {max}")]
    TooManySlots {
        /// Declared slot count.
        count: usize,
        /// Maximum supported slot count.
        max: usize,
    },

    /// An operation required an initial-state snapshot that was never taken.
    #[error("view has no initial state snapshot")]
    MissingInitialState,

    /// A list index is outside the current content.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The current length.
        len: usize,
    },

    /// A map key was not present.
    #[error("key not present in map: {key}")]
    KeyNotFound {
        /// Display form of the missing key.
        key: String,
    },
}

impl ModelError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::TypeMismatch { expected, actual }
    }

    /// Creates a slot-out-of-range error.
    pub fn slot_out_of_range(slot: usize, len: usize) -> Self {
        Self::SlotOutOfRange { slot, len }
    }

    /// Creates a key-not-found error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }
}
