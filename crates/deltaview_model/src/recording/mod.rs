//! Change-recording containers.
//!
//! A recording container wraps an ordered sequence or key-value mapping,
//! records every structural mutation as an action in an append-only log, and
//! exposes both the current materialized content and the action log for
//! replay. The flush engine compresses the log into a minimal operation set.

mod list;
mod map;

pub use list::{ListAction, RecordingList};
pub use map::{MapAction, RecordingMap};
