//! # DeltaView Model
//!
//! Value model and mutable view-object layer for DeltaView.
//!
//! This crate provides:
//! - A dynamic scalar value type and object identifiers
//! - View objects with slot arrays, dirty bitmasks, and initial-state
//!   snapshots
//! - Change-recording list and map containers with append-only action logs
//! - Managed-record representation for the store side
//! - Slot/column attribute accessors
//!
//! The flush engine in `deltaview_engine` consumes these types; nothing in
//! this crate talks to a store.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accessor;
mod dirty;
mod error;
mod id;
mod record;
mod recording;
mod value;
mod view;

pub use accessor::AttributeAccessor;
pub use dirty::{DirtyKind, DirtyMask, MAX_TRACKED_SLOTS};
pub use error::{ModelError, ModelResult};
pub use id::ObjectId;
pub use record::{Record, RecordRef};
pub use recording::{ListAction, MapAction, RecordingList, RecordingMap};
pub use value::ScalarValue;
pub use view::{AttributeValue, ParentLink, ViewObject, ViewRef};
