//! # DeltaView Engine
//!
//! Flush reconciliation engine for entity view graphs.
//!
//! The engine sits between mutable view objects — client-shaped projections
//! of stored records — and a relational persistence store. It detects
//! exactly what changed in a view graph since it was loaded and translates
//! the change into the minimal, correctly ordered set of store operations,
//! while respecting optimistic-concurrency versions, referential-integrity
//! ordering, and inverse relationship semantics.
//!
//! This crate provides:
//! - Type descriptors and view-type mappings (registration-time metadata)
//! - Fetch graphs with superset merging
//! - The attribute-flusher sum type and the composite flush orchestrator
//! - Fused (compressed) action summaries for collections and maps
//! - Inverse flushers and unmapped-relation cascade deleters
//! - The structural statement model and store-session contract

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cascade;
mod context;
mod descriptor;
mod error;
mod fetch_graph;
mod flusher;
mod fused;
mod inverse;
mod mapping;
mod session;
mod statement;
mod updater;

pub use cascade::{CascadeAction, DeletePlan, PostRemoveCascade, PreRemoveCascade};
pub use context::{FlushContext, PostFlushAction};
pub use descriptor::TypeDescriptor;
pub use error::{FlushError, FlushResult};
pub use fetch_graph::FetchGraphNode;
pub use flusher::{
    AttributeFlusher, BasicAttributeFlusher, CollectionAttributeFlusher,
    CompositeAttributeFlusher, EmbeddableAttributeFlusher, IndexedListAttributeFlusher,
    MapAttributeFlusher, ParentRefAttributeFlusher, SubviewAttributeFlusher,
    VersionAttributeFlusher,
};
pub use fused::{
    FusedCollectionActions, FusedCollectionIndexActions, FusedMapActions, IndexTranslation,
    RemoveRange, ReplaceOperation,
};
pub use inverse::InverseFlusher;
pub use mapping::{
    AttributeKind, AttributeMapping, FlushMode, FlushStrategy, InverseMapping,
    InverseRemoveStrategy, ViewTypeMapping,
};
pub use session::{
    Predicate, SessionError, SessionResult, Statement, StatementKind, StoreSession,
};
pub use statement::StatementBuilder;
pub use updater::{UpdaterRegistry, ViewUpdater};

/// Re-export of the model-layer dirty kind, used throughout the flusher API.
pub use deltaview_model::DirtyKind;
