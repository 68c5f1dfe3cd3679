//! Application state shared by the command handlers.
//!
//! An [`AppContext`] owns the store and one [`ItemIndex`] per entity kind.
//! Every mutation is written to the store first; the matching index is only
//! updated once the store has accepted it.

use std::path::Path;

use tracing::instrument;

use crate::{
    domain::{AssociationSet, Config, EntityKind, IndexError, ItemId, ItemIndex, Relation},
    storage::{AssociationDiff, NewItem, SqliteStore, StoreError},
};

/// Errors raised by [`AppContext`] operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store rejected or failed the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The index rejected the operation.
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug)]
struct Indexes {
    requirements: ItemIndex,
    use_cases: ItemIndex,
    tests: ItemIndex,
    sources: ItemIndex,
}

impl Indexes {
    fn load(store: &SqliteStore) -> Result<Self, IndexError> {
        Ok(Self {
            requirements: ItemIndex::load(EntityKind::Requirement, store)?,
            use_cases: ItemIndex::load(EntityKind::UseCase, store)?,
            tests: ItemIndex::load(EntityKind::Test, store)?,
            sources: ItemIndex::load(EntityKind::Source, store)?,
        })
    }

    const fn get(&self, kind: EntityKind) -> &ItemIndex {
        match kind {
            EntityKind::Requirement => &self.requirements,
            EntityKind::UseCase => &self.use_cases,
            EntityKind::Test => &self.tests,
            EntityKind::Source => &self.sources,
        }
    }

    const fn get_mut(&mut self, kind: EntityKind) -> &mut ItemIndex {
        match kind {
            EntityKind::Requirement => &mut self.requirements,
            EntityKind::UseCase => &mut self.use_cases,
            EntityKind::Test => &mut self.tests,
            EntityKind::Source => &mut self.sources,
        }
    }
}

/// The store together with the indexes built from it.
#[derive(Debug)]
pub struct AppContext {
    store: SqliteStore,
    indexes: Indexes,
}

impl AppContext {
    /// Opens the project database under `root` and builds every index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or read.
    #[instrument(skip(config))]
    pub fn open(root: &Path, config: &Config) -> Result<Self, Error> {
        let store = SqliteStore::open(&config.database_path(root), config.wal_mode)?;
        Self::from_store(store)
    }

    /// Builds every index from an already opened store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn from_store(store: SqliteStore) -> Result<Self, Error> {
        let indexes = Indexes::load(&store)?;
        Ok(Self { store, indexes })
    }

    /// The index for `kind`.
    #[must_use]
    pub const fn index(&self, kind: EntityKind) -> &ItemIndex {
        self.indexes.get(kind)
    }

    /// The index for `kind`, for subscribing to its notifications.
    pub const fn index_mut(&mut self, kind: EntityKind) -> &mut ItemIndex {
        self.indexes.get_mut(kind)
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// The underlying store, for mutations that no index tracks.
    pub const fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    /// Creates an item and adds it to its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the item.
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub fn create(&mut self, kind: EntityKind, item: NewItem) -> Result<(), Error> {
        self.store.create(kind, &item)?;
        let NewItem { id, parent, .. } = item;
        self.apply(kind, |index| {
            index.append_child_to_parent(id, parent.as_ref())
        })
    }

    /// Renames an item in the store and in its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the rename.
    #[instrument(skip(self))]
    pub fn rename(
        &mut self,
        kind: EntityKind,
        old_id: &ItemId,
        new_id: ItemId,
    ) -> Result<(), Error> {
        self.store.rename(kind, old_id, &new_id)?;
        self.apply(kind, |index| index.rename(old_id, new_id))
    }

    /// Moves an item under a new parent, or to the top level.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the move.
    #[instrument(skip(self))]
    pub fn reparent(
        &mut self,
        kind: EntityKind,
        id: &ItemId,
        parent: Option<&ItemId>,
    ) -> Result<(), Error> {
        self.store.set_parent(kind, id, parent)?;
        self.apply(kind, |index| index.reparent(id, parent))
    }

    /// Deletes an item; its children move to the top level.
    ///
    /// If `open_set` is the association set being edited for this item, it is
    /// marked as owner-deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    #[instrument(skip(self, open_set))]
    pub fn delete(
        &mut self,
        kind: EntityKind,
        id: &ItemId,
        open_set: Option<&mut AssociationSet>,
    ) -> Result<(), Error> {
        self.store.delete(kind, id)?;
        let owned = |set: &&mut AssociationSet| set.relation().owner() == kind && set.owner() == id;
        if let Some(set) = open_set.filter(owned) {
            set.mark_owner_deleted();
        }
        self.apply(kind, |index| index.delete(id))
    }

    /// Loads the association set of `owner` for editing.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner is unknown or the store cannot be read.
    pub fn association_set(
        &self,
        relation: Relation,
        owner: &ItemId,
    ) -> Result<AssociationSet, Error> {
        if !self.index(relation.owner()).contains(owner) {
            return Err(IndexError::NotFound {
                kind: relation.owner(),
                id: owner.clone(),
            }
            .into());
        }
        Ok(AssociationSet::load(&self.store, relation, owner.clone())?)
    }

    /// Writes an edited association set back to the store.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::OwnerDeleted`] if the owner has been deleted, or
    /// an error if the store rejects the change.
    pub fn save_associations(&mut self, set: &AssociationSet) -> Result<AssociationDiff, Error> {
        if set.is_owner_deleted() {
            return Err(IndexError::OwnerDeleted {
                kind: set.relation().owner(),
                owner: set.owner().clone(),
            }
            .into());
        }
        Ok(self
            .store
            .save_associations(set.relation(), set.owner(), set.associated_ids())?)
    }

    /// Applies an already stored change to the index of `kind`.
    ///
    /// If the index disagrees with the store it is rebuilt from the store.
    fn apply(
        &mut self,
        kind: EntityKind,
        op: impl FnOnce(&mut ItemIndex) -> Result<(), IndexError>,
    ) -> Result<(), Error> {
        let index = self.indexes.get_mut(kind);
        if let Err(e) = op(index) {
            tracing::warn!("{kind} index out of step with the store, reloading: {e}");
            index.initialize(&self.store)?;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{change::testing::Recorder, Change, ErrorClass, Outline};

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    fn context() -> AppContext {
        let mut context = AppContext::from_store(SqliteStore::open_in_memory().unwrap()).unwrap();
        context
            .create(EntityKind::Requirement, NewItem::new(id("R1")))
            .unwrap();
        context
            .create(EntityKind::Requirement, NewItem::new(id("R1.1")).with_parent(id("R1")))
            .unwrap();
        context
            .create(EntityKind::Test, NewItem::new(id("T1")).with_description("smoke"))
            .unwrap();
        context
    }

    /// Asserts the index matches a fresh rebuild from the store.
    fn assert_in_step(context: &AppContext, kind: EntityKind) {
        let rebuilt = ItemIndex::load(kind, context.store()).unwrap();
        assert_eq!(context.index(kind).outline(), rebuilt.outline());
    }

    #[test]
    fn mutations_keep_index_and_store_in_step() {
        let mut context = context();
        context
            .create(EntityKind::Requirement, NewItem::new(id("R2")))
            .unwrap();
        context
            .reparent(EntityKind::Requirement, &id("R1.1"), Some(&id("R2")))
            .unwrap();
        context
            .rename(EntityKind::Requirement, &id("R2"), id("R3"))
            .unwrap();
        assert_in_step(&context, EntityKind::Requirement);

        context
            .delete(EntityKind::Requirement, &id("R3"), None)
            .unwrap();
        assert_in_step(&context, EntityKind::Requirement);
        assert_eq!(
            context.index(EntityKind::Requirement).outline().top_level_ids(),
            ["R1", "R1.1"]
        );
    }

    #[test]
    fn store_rejection_leaves_index_untouched() {
        let mut context = context();
        let recorder = Recorder::default();
        context
            .index_mut(EntityKind::Requirement)
            .subscribe(recorder.callback());
        let before: Outline = context.index(EntityKind::Requirement).outline();

        let err = context
            .reparent(EntityKind::Requirement, &id("R1"), Some(&id("R1.1")))
            .unwrap_err();

        assert!(matches!(err, Error::Store(StoreError::Cycle { .. })));
        assert_eq!(context.index(EntityKind::Requirement).outline(), before);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn create_notifies_subscribers() {
        let mut context = context();
        let recorder = Recorder::default();
        context
            .index_mut(EntityKind::Test)
            .subscribe(recorder.callback());

        context
            .create(EntityKind::Test, NewItem::new(id("T2")))
            .unwrap();

        assert_eq!(
            recorder.take(),
            vec![
                Change::RowsAboutToBeInserted {
                    parent: None,
                    first: 1,
                    last: 1
                },
                Change::RowsInserted {
                    parent: None,
                    first: 1,
                    last: 1
                },
            ]
        );
    }

    #[test]
    fn associations_round_trip_through_the_store() {
        let mut context = context();
        let mut set = context
            .association_set(Relation::REQUIREMENT_TESTS, &id("R1"))
            .unwrap();
        assert!(set.toggle(&id("T1"), true).unwrap());

        let diff = context.save_associations(&set).unwrap();

        assert_eq!(diff.added, [id("T1")].into_iter().collect());
        let reloaded = context
            .association_set(Relation::TEST_REQUIREMENTS, &id("T1"))
            .unwrap();
        assert!(reloaded.is_associated(&id("R1")));
    }

    #[test]
    fn association_set_requires_known_owner() {
        let context = context();
        let Error::Index(err) = context
            .association_set(Relation::REQUIREMENT_TESTS, &id("R9"))
            .unwrap_err()
        else {
            panic!("expected an index error");
        };
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn deleting_the_owner_invalidates_its_set() {
        let mut context = context();
        let mut set = context
            .association_set(Relation::REQUIREMENT_TESTS, &id("R1"))
            .unwrap();

        context
            .delete(EntityKind::Requirement, &id("R1"), Some(&mut set))
            .unwrap();

        assert!(set.is_owner_deleted());
        assert!(matches!(
            set.toggle(&id("T1"), true),
            Err(IndexError::OwnerDeleted { .. })
        ));
        assert!(matches!(
            context.save_associations(&set),
            Err(Error::Index(IndexError::OwnerDeleted { .. }))
        ));
    }

    #[test]
    fn deleting_another_item_leaves_set_usable() {
        let mut context = context();
        let mut set = context
            .association_set(Relation::REQUIREMENT_TESTS, &id("R1"))
            .unwrap();

        context
            .delete(EntityKind::Requirement, &id("R1.1"), Some(&mut set))
            .unwrap();

        assert!(!set.is_owner_deleted());
    }

    #[test]
    fn open_reads_existing_project() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::default();
        {
            let mut context = AppContext::open(root.path(), &config).unwrap();
            context
                .create(EntityKind::UseCase, NewItem::new(id("UC1")).with_description("log in"))
                .unwrap();
        }

        let context = AppContext::open(root.path(), &config).unwrap();
        assert!(context.index(EntityKind::UseCase).contains(&id("UC1")));
        assert!(context.index(EntityKind::Requirement).is_empty());
    }
}
