//! Domain models for the item index.
//!
//! This module contains the identifiers and kinds of the managed entities,
//! the in-memory forest index kept in step with the store, and the staged
//! association sets used while editing links between entities.

mod association;
pub use association::{AssociationSet, Candidate};

mod attribute;
pub use attribute::{Priority, RequirementType, UnknownAttributeError};

/// Change notifications emitted by indexes and association sets.
pub mod change;
pub use change::{Change, SubscriptionId};

mod config;
pub use config::Config;

mod forest;
pub use forest::{Outline, OutlineNode};

/// The forest index over one entity kind.
pub mod index;
pub use index::{ErrorClass, IndexError, ItemIndex, Node};

mod item_id;
pub use item_id::{EmptyIdError, ItemId};

mod kind;
pub use kind::{EntityKind, Layout, Relation, UnknownKindError, UnsupportedRelation};
