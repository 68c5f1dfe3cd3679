//! Hierarchical item indexes for requirements management
//!
//! Requirements, use cases, tests and sources are persisted in a SQLite
//! database. Each entity kind is mirrored in memory by an [`ItemIndex`], a
//! forest kept in step with the store and observable through [`Change`]
//! notifications. Links between kinds are edited through an
//! [`AssociationSet`] and written back as a single diff.

pub mod domain;
pub use domain::{
    AssociationSet, Candidate, Change, Config, EntityKind, ErrorClass, IndexError, ItemId,
    ItemIndex, Layout, Node, Outline, OutlineNode, Priority, Relation, RequirementType,
    SubscriptionId,
};

/// Persistence for the managed entities.
pub mod storage;
pub use storage::{AssociationDiff, ItemRecord, NewItem, SqliteStore, Store, StoreError};

pub mod context;
pub use context::AppContext;
