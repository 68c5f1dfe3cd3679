//! Persistence for requirements, use cases, tests and sources.
//!
//! The [`Store`] trait is the narrow read interface the in-memory indexes need
//! to rebuild themselves. [`SqliteStore`] implements it together with the
//! mutations the application performs before updating its indexes.

use std::{collections::BTreeSet, path::PathBuf};

use crate::domain::{Candidate, EmptyIdError, EntityKind, ItemId, Relation};

mod sqlite;
pub use sqlite::{AssociationDiff, ItemRecord, NewItem, SqliteStore};

/// Read queries an index needs from the backing store.
pub trait Store {
    /// Identifiers of the items of `kind` with no parent, ordered by
    /// identifier. For flat kinds this is every item.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn top_level_ids(&self, kind: EntityKind) -> Result<Vec<ItemId>, StoreError>;

    /// Identifiers of the children of `parent`, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn child_ids(&self, kind: EntityKind, parent: &ItemId) -> Result<Vec<ItemId>, StoreError>;

    /// Every item of `kind` with its description.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn candidate_list(&self, kind: EntityKind) -> Result<Vec<Candidate>, StoreError>;

    /// The targets currently associated with `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn associated_ids(
        &self,
        relation: Relation,
        owner: &ItemId,
    ) -> Result<BTreeSet<ItemId>, StoreError>;
}

/// Errors returned by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No item of this kind has the given identifier.
    #[error("{kind} {id} not found")]
    NotFound {
        /// The kind looked up.
        kind: EntityKind,
        /// The missing identifier.
        id: ItemId,
    },

    /// Another item of this kind already has the identifier.
    #[error("{kind} {id} already exists")]
    DuplicateId {
        /// The kind of the item.
        kind: EntityKind,
        /// The conflicting identifier.
        id: ItemId,
    },

    /// A parent was given for a kind without a hierarchy.
    #[error("{kind} items cannot have a parent")]
    NotHierarchical {
        /// The flat kind.
        kind: EntityKind,
    },

    /// The new parent is the item itself or one of its descendants.
    #[error("{kind} {id} cannot be placed under its own descendant {parent}")]
    Cycle {
        /// The kind of the items.
        kind: EntityKind,
        /// The item being moved.
        id: ItemId,
        /// The requested parent.
        parent: ItemId,
    },

    /// Items of this kind carry no description.
    #[error("{kind} items have no description")]
    NoDescription {
        /// The kind without descriptions.
        kind: EntityKind,
    },

    /// Items of this kind do not carry the attribute.
    #[error("{kind} items have no {attribute}")]
    NoAttribute {
        /// The kind of the item.
        kind: EntityKind,
        /// The attribute that was set.
        attribute: &'static str,
    },

    /// The database holds a type or priority code this build does not know.
    #[error("unknown {attribute} code '{code}' in database")]
    UnknownCode {
        /// The attribute the code belongs to.
        attribute: &'static str,
        /// The stored code.
        code: String,
    },

    /// The database holds an empty identifier.
    #[error("invalid identifier in database")]
    InvalidId(#[from] EmptyIdError),

    /// The database was written by a newer version of the application.
    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema {
        /// The version recorded in the database.
        found: i32,
        /// The newest version this build understands.
        supported: i32,
    },

    /// The database file could not be opened.
    #[error("failed to open database at {}", path.display())]
    Open {
        /// The database path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[cfg(test)]
pub(crate) mod fixture {
    use std::collections::{BTreeMap, BTreeSet};

    use super::{Store, StoreError};
    use crate::domain::{Candidate, EntityKind, ItemId, Relation};

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    /// A canned store that answers in insertion order, so tests can check
    /// that callers impose their own ordering.
    #[derive(Debug, Default)]
    pub(crate) struct FixtureStore {
        items: Vec<(EntityKind, ItemId, Option<ItemId>)>,
        extra_children: Vec<(EntityKind, ItemId, ItemId)>,
        candidates: BTreeMap<EntityKind, Vec<Candidate>>,
        associations: Vec<(Relation, ItemId, ItemId)>,
    }

    impl FixtureStore {
        pub(crate) fn with_item(
            mut self,
            kind: EntityKind,
            item: &str,
            parent: Option<&str>,
        ) -> Self {
            self.items.push((kind, id(item), parent.map(id)));
            self
        }

        /// Reports `child` under `parent` in addition to the item table.
        pub(crate) fn with_child_override(
            mut self,
            kind: EntityKind,
            parent: &str,
            child: &str,
        ) -> Self {
            self.extra_children.push((kind, id(parent), id(child)));
            self
        }

        pub(crate) fn with_candidate(
            mut self,
            kind: EntityKind,
            item: &str,
            description: &str,
        ) -> Self {
            self.candidates
                .entry(kind)
                .or_default()
                .push(Candidate::new(id(item), description));
            self
        }

        pub(crate) fn with_association(
            mut self,
            relation: Relation,
            owner: &str,
            target: &str,
        ) -> Self {
            self.associations.push((relation, id(owner), id(target)));
            self
        }
    }

    impl Store for FixtureStore {
        fn top_level_ids(&self, kind: EntityKind) -> Result<Vec<ItemId>, StoreError> {
            Ok(self
                .items
                .iter()
                .filter(|(k, _, parent)| *k == kind && parent.is_none())
                .map(|(_, item, _)| item.clone())
                .collect())
        }

        fn child_ids(&self, kind: EntityKind, parent: &ItemId) -> Result<Vec<ItemId>, StoreError> {
            let listed = self
                .items
                .iter()
                .filter(|(k, _, p)| *k == kind && p.as_ref() == Some(parent))
                .map(|(_, item, _)| item.clone());
            let extra = self
                .extra_children
                .iter()
                .filter(|(k, p, _)| *k == kind && p == parent)
                .map(|(_, _, child)| child.clone());
            Ok(listed.chain(extra).collect())
        }

        fn candidate_list(&self, kind: EntityKind) -> Result<Vec<Candidate>, StoreError> {
            Ok(self.candidates.get(&kind).cloned().unwrap_or_default())
        }

        fn associated_ids(
            &self,
            relation: Relation,
            owner: &ItemId,
        ) -> Result<BTreeSet<ItemId>, StoreError> {
            Ok(self
                .associations
                .iter()
                .filter(|(r, o, _)| *r == relation && o == owner)
                .map(|(_, _, target)| target.clone())
                .collect())
        }
    }
}
