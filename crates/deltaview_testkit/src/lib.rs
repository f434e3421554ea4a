//! # DeltaView Testkit
//!
//! Test utilities for DeltaView.
//!
//! This crate provides:
//! - An in-memory store session executing the structural statement model,
//!   with a statement log and a RETURNING capability toggle
//! - Canned view-type fixtures and loaded view graphs
//! - Property-based generators for action scripts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deltaview_testkit::prelude::*;
//!
//! let mut session = MemorySession::new();
//! let author = loaded_author(1, "alice");
//! let post = loaded_post(1, 1, "hello", &author);
//! seed_post(&mut session, &post);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod session;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::session::*;
}

pub use fixtures::*;
pub use generators::*;
pub use session::*;
