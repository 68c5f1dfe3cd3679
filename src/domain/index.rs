//! In-memory index of one entity kind.
//!
//! The [`ItemIndex`] mirrors the parent/child relation held by the store as a
//! forest and keeps it in step with mutations the caller has already persisted.
//! It only reads from the store when rebuilt with [`ItemIndex::initialize`].
//!
//! Kinds with a [`Layout::Flat`] layout use the same index: their forest is
//! simply never deeper than one level.

use std::fmt;

use tracing::instrument;

use crate::{
    domain::{
        change::{Change, Notifier, SubscriptionId},
        forest::{Forest, NodeId, Outline},
        EntityKind, ItemId, Layout,
    },
    storage::{Store, StoreError},
};

/// Errors raised by [`ItemIndex`] and
/// [`AssociationSet`](crate::domain::AssociationSet) operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The operation referenced an identifier the index does not hold.
    #[error("{kind} {id} not found")]
    NotFound {
        /// The kind of the missing item.
        kind: EntityKind,
        /// The missing identifier.
        id: ItemId,
    },

    /// The identifier is already held by another item of the same kind.
    #[error("{kind} {id} already exists")]
    DuplicateId {
        /// The kind of the item.
        kind: EntityKind,
        /// The conflicting identifier.
        id: ItemId,
    },

    /// A parent was given for, or a move attempted on, a flat kind.
    #[error("{kind} items cannot have a parent")]
    NotHierarchical {
        /// The flat kind.
        kind: EntityKind,
    },

    /// The move would make an item its own ancestor.
    #[error("moving {kind} {id} under {parent} would create a cycle")]
    Cycle {
        /// The kind of the items.
        kind: EntityKind,
        /// The item being moved.
        id: ItemId,
        /// The requested new parent.
        parent: ItemId,
    },

    /// The association set's owner was deleted.
    #[error("{kind} {owner} has been deleted")]
    OwnerDeleted {
        /// The owner's kind.
        kind: EntityKind,
        /// The owner's identifier.
        owner: ItemId,
    },

    /// The store reported the same identifier twice while rebuilding.
    #[error("store reported {kind} {id} more than once")]
    InconsistentStore {
        /// The kind being rebuilt.
        kind: EntityKind,
        /// The repeated identifier.
        id: ItemId,
    },

    /// The store could not be read.
    #[error("failed to read {kind} items from the store")]
    Store {
        /// The kind being read.
        kind: EntityKind,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },
}

/// The broad class of an [`IndexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// An identifier was not present.
    NotFound,
    /// The operation is not valid in the current state.
    InvalidOperation,
    /// The store failed or returned inconsistent data.
    Store,
}

impl IndexError {
    /// Classifies the error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::DuplicateId { .. }
            | Self::NotHierarchical { .. }
            | Self::Cycle { .. }
            | Self::OwnerDeleted { .. } => ErrorClass::InvalidOperation,
            Self::InconsistentStore { .. } | Self::Store { .. } => ErrorClass::Store,
        }
    }
}

/// A forest of the items of one entity kind.
pub struct ItemIndex {
    kind: EntityKind,
    forest: Forest,
    notifier: Notifier,
}

impl ItemIndex {
    /// Creates an empty index for the given kind.
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            forest: Forest::default(),
            notifier: Notifier::default(),
        }
    }

    /// Creates an index for the given kind and fills it from the store.
    ///
    /// # Errors
    ///
    /// See [`ItemIndex::initialize`].
    pub fn load<S: Store + ?Sized>(kind: EntityKind, store: &S) -> Result<Self, IndexError> {
        let mut index = Self::new(kind);
        index.initialize(store)?;
        Ok(index)
    }

    /// The entity kind this index holds.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Whether items of this index may have children.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.kind.layout()
    }

    /// Number of items in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forest.len()
    }

    /// Returns `true` if the index holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forest.len() == 0
    }

    /// Discards the forest and rebuilds it from the store.
    ///
    /// Siblings are sorted by identifier at every level. The new forest is
    /// built aside and swapped in whole; on error the previous forest is kept.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the store cannot be read, or
    /// [`IndexError::InconsistentStore`] if it reports an identifier twice
    /// (which also catches cyclic parent data).
    #[instrument(skip(self, store), fields(kind = %self.kind))]
    pub fn initialize<S: Store + ?Sized>(&mut self, store: &S) -> Result<(), IndexError> {
        let forest = self.build(store)?;

        self.notifier.emit(&Change::AboutToReset);
        self.forest = forest;
        self.notifier.emit(&Change::Reset);

        tracing::debug!(items = self.forest.len(), "rebuilt index");
        Ok(())
    }

    fn build<S: Store + ?Sized>(&self, store: &S) -> Result<Forest, IndexError> {
        let store_error = |source| IndexError::Store {
            kind: self.kind,
            source,
        };

        let mut forest = Forest::default();
        let mut pending = Vec::new();

        let mut top_level = store.top_level_ids(self.kind).map_err(store_error)?;
        top_level.sort();
        for id in top_level {
            pending.push(self.place(&mut forest, id, None)?);
        }

        if self.layout() == Layout::Flat {
            return Ok(forest);
        }

        while let Some(node) = pending.pop() {
            let mut children = store
                .child_ids(self.kind, forest.id(node))
                .map_err(store_error)?;
            children.sort();
            for id in children {
                pending.push(self.place(&mut forest, id, Some(node))?);
            }
        }

        Ok(forest)
    }

    fn place(
        &self,
        forest: &mut Forest,
        id: ItemId,
        parent: Option<NodeId>,
    ) -> Result<NodeId, IndexError> {
        if forest.contains(&id) {
            return Err(IndexError::InconsistentStore {
                kind: self.kind,
                id,
            });
        }
        Ok(forest.push(id, parent))
    }

    /// Adds a new leaf item.
    ///
    /// With no parent the item is appended to the top level; otherwise it is
    /// appended to the end of the parent's children.
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotHierarchical`] if a parent is given for a flat kind
    /// - [`IndexError::DuplicateId`] if `id` is already present
    /// - [`IndexError::NotFound`] if the parent is not present
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn append_child_to_parent(
        &mut self,
        id: ItemId,
        parent: Option<&ItemId>,
    ) -> Result<(), IndexError> {
        if parent.is_some() {
            self.ensure_hierarchical()?;
        }
        if self.forest.contains(&id) {
            return Err(self.duplicate(id));
        }
        let parent_node = parent.map(|p| self.lookup(p)).transpose()?;

        let row = self.forest.siblings(parent_node).len();
        self.notifier
            .inserting(parent, row, row, || self.forest.push(id, parent_node));
        Ok(())
    }

    /// Changes an item's identifier, leaving its position untouched.
    ///
    /// Emits a single [`Change::DataChanged`].
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotFound`] if `old_id` is not present
    /// - [`IndexError::DuplicateId`] if `new_id` belongs to another item
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn rename(&mut self, old_id: &ItemId, new_id: ItemId) -> Result<(), IndexError> {
        let node = self.lookup(old_id)?;
        if &new_id != old_id && self.forest.contains(&new_id) {
            return Err(self.duplicate(new_id));
        }

        self.forest.rename(node, new_id);

        let change = Change::DataChanged {
            parent: self.parent_id(node),
            row: self.forest.row(node),
        };
        self.notifier.emit(&change);
        Ok(())
    }

    /// Moves an item (with its subtree) to the end of `new_parent`'s children,
    /// or to the end of the top level.
    ///
    /// Moving an item to the parent it already has does nothing.
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotHierarchical`] for flat kinds
    /// - [`IndexError::NotFound`] if either identifier is not present
    /// - [`IndexError::Cycle`] if `new_parent` is the item or one of its
    ///   descendants
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn reparent(&mut self, id: &ItemId, new_parent: Option<&ItemId>) -> Result<(), IndexError> {
        self.ensure_hierarchical()?;
        let node = self.lookup(id)?;
        let target = new_parent.map(|p| self.lookup(p)).transpose()?;

        if let (Some(target), Some(parent)) = (target, new_parent) {
            if self.forest.is_ancestor_or_self(node, target) {
                return Err(IndexError::Cycle {
                    kind: self.kind,
                    id: id.clone(),
                    parent: parent.clone(),
                });
            }
        }

        if self.forest.parent(node) == target {
            tracing::debug!("parent unchanged");
            return Ok(());
        }

        let old_parent = self.parent_id(node);
        let row = self.forest.row(node);
        self.notifier
            .removing(old_parent.as_ref(), row, row, || self.forest.detach(node));

        let row = self.forest.siblings(target).len();
        self.notifier
            .inserting(new_parent, row, row, || self.forest.attach(node, target));
        Ok(())
    }

    /// Removes an item.
    ///
    /// Its children are not removed: they are promoted to the end of the top
    /// level, keeping their relative order, mirroring the store clearing their
    /// parent reference.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotFound`] if `id` is not present.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn delete(&mut self, id: &ItemId) -> Result<(), IndexError> {
        let node = self.lookup(id)?;
        let parent = self.parent_id(node);
        let row = self.forest.row(node);

        let orphans = self
            .notifier
            .removing(parent.as_ref(), row, row, || self.forest.remove(node));

        if orphans.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = orphans.len(), "promoting children to top level");
        let first = self.forest.roots().len();
        let last = first + orphans.len() - 1;
        self.notifier.inserting(None, first, last, || {
            for orphan in orphans {
                self.forest.attach(orphan, None);
            }
        });
        Ok(())
    }

    /// Looks up an item anywhere in the forest.
    #[must_use]
    pub fn find(&self, id: &ItemId) -> Option<Node<'_>> {
        self.forest.find(id).map(|handle| self.node(handle))
    }

    /// Returns `true` if the index holds `id`.
    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.forest.contains(id)
    }

    /// The top-level items, in order.
    pub fn top_level(&self) -> impl ExactSizeIterator<Item = Node<'_>> + '_ {
        self.forest.roots().iter().map(|&handle| self.node(handle))
    }

    /// Every item, parents before children, siblings in order.
    pub fn iter(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        self.forest.iter().map(|handle| self.node(handle))
    }

    /// Number of children under `parent`, or of top-level items for `None`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotFound`] if `parent` is not present.
    pub fn row_count(&self, parent: Option<&ItemId>) -> Result<usize, IndexError> {
        let parent = parent.map(|p| self.lookup(p)).transpose()?;
        Ok(self.forest.siblings(parent).len())
    }

    /// The item at `row` under `parent` (or at the top level for `None`).
    #[must_use]
    pub fn child_at(&self, parent: Option<&ItemId>, row: usize) -> Option<Node<'_>> {
        let parent = match parent {
            Some(p) => Some(self.forest.find(p)?),
            None => None,
        };
        let handle = *self.forest.siblings(parent).get(row)?;
        Some(self.node(handle))
    }

    /// An owned snapshot of the forest.
    #[must_use]
    pub fn outline(&self) -> Outline {
        self.forest.outline()
    }

    /// Registers a callback invoked for every change to the index.
    pub fn subscribe(&mut self, callback: impl FnMut(&Change) + 'static) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    /// Removes a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

impl ItemIndex {
    const fn node(&self, handle: NodeId) -> Node<'_> {
        Node {
            forest: &self.forest,
            handle,
        }
    }

    fn lookup(&self, id: &ItemId) -> Result<NodeId, IndexError> {
        self.forest.find(id).ok_or_else(|| IndexError::NotFound {
            kind: self.kind,
            id: id.clone(),
        })
    }

    fn parent_id(&self, node: NodeId) -> Option<ItemId> {
        self.forest
            .parent(node)
            .map(|parent| self.forest.id(parent).clone())
    }

    fn duplicate(&self, id: ItemId) -> IndexError {
        IndexError::DuplicateId {
            kind: self.kind,
            id,
        }
    }

    fn ensure_hierarchical(&self) -> Result<(), IndexError> {
        match self.layout() {
            Layout::Tree => Ok(()),
            Layout::Flat => Err(IndexError::NotHierarchical { kind: self.kind }),
        }
    }
}

impl fmt::Debug for ItemIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemIndex")
            .field("kind", &self.kind)
            .field("forest", &self.outline())
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// A borrowed view of one item in an [`ItemIndex`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    forest: &'a Forest,
    handle: NodeId,
}

impl<'a> Node<'a> {
    /// The item's identifier.
    #[must_use]
    pub fn id(&self) -> &'a ItemId {
        self.forest.id(self.handle)
    }

    /// The item's parent, or `None` for a top-level item.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.forest.parent(self.handle).map(|handle| Self {
            forest: self.forest,
            handle,
        })
    }

    /// The item's children, in order.
    pub fn children(&self) -> impl ExactSizeIterator<Item = Node<'a>> + use<'a> {
        let forest = self.forest;
        forest
            .children(self.handle)
            .iter()
            .map(move |&handle| Node { forest, handle })
    }

    /// Position of the item among its siblings.
    #[must_use]
    pub fn row(&self) -> usize {
        self.forest.row(self.handle)
    }

    /// Number of ancestors; `0` for top-level items.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.forest.depth(self.handle)
    }

    /// Returns `true` if the item has no parent.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.forest.parent(self.handle).is_none()
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", self.id())
            .field("row", &self.row())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;
    use crate::{domain::change::testing::Recorder, storage::fixture::FixtureStore};

    fn id(s: &str) -> ItemId {
        s.parse().unwrap()
    }

    fn ids<'a>(nodes: impl Iterator<Item = Node<'a>>) -> Vec<&'a str> {
        nodes.map(|node| node.id().as_str()).collect()
    }

    /// Top level `A`, `B`; `A` has children `A.1`, `A.2`.
    fn sample() -> ItemIndex {
        let mut index = ItemIndex::new(EntityKind::Requirement);
        index.append_child_to_parent(id("A"), None).unwrap();
        index.append_child_to_parent(id("B"), None).unwrap();
        index.append_child_to_parent(id("A.1"), Some(&id("A"))).unwrap();
        index.append_child_to_parent(id("A.2"), Some(&id("A"))).unwrap();
        index
    }

    fn recorded(index: &mut ItemIndex) -> Recorder {
        let recorder = Recorder::default();
        index.subscribe(recorder.callback());
        recorder
    }

    #[test]
    fn appends_under_parent() {
        let index = sample();
        index.forest.assert_consistent();

        let a2 = index.find(&id("A.2")).unwrap();
        assert_eq!(a2.parent().unwrap().id().as_str(), "A");
        assert_eq!(a2.row(), 1);
        assert_eq!(a2.depth(), 1);
        assert_eq!(ids(index.top_level()), ["A", "B"]);
    }

    #[test]
    fn append_to_missing_parent_fails() {
        let mut index = sample();
        let err = index
            .append_child_to_parent(id("C.1"), Some(&id("C")))
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::NotFound);
        assert!(index.find(&id("C.1")).is_none());
    }

    #[test]
    fn append_duplicate_fails() {
        let mut index = sample();
        let err = index.append_child_to_parent(id("A.1"), None).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId { .. }));
    }

    #[test]
    fn append_notifies_with_sibling_position() {
        let mut index = sample();
        let recorder = recorded(&mut index);

        index.append_child_to_parent(id("A.3"), Some(&id("A"))).unwrap();

        let parent = Some(id("A"));
        assert_eq!(
            recorder.take(),
            [
                Change::RowsAboutToBeInserted {
                    parent: parent.clone(),
                    first: 2,
                    last: 2
                },
                Change::RowsInserted {
                    parent,
                    first: 2,
                    last: 2
                },
            ]
        );
    }

    #[test]
    fn delete_promotes_children_in_order() {
        let mut index = sample();
        index.delete(&id("A")).unwrap();

        assert_eq!(ids(index.top_level()), ["B", "A.1", "A.2"]);
        assert!(index.find(&id("A")).is_none());
        assert!(index.top_level().all(|node| node.children().len() == 0));
        index.forest.assert_consistent();
    }

    #[test]
    fn delete_notifies_removal_then_promotion() {
        let mut index = sample();
        let recorder = recorded(&mut index);

        index.delete(&id("A")).unwrap();

        assert_eq!(
            recorder.take(),
            [
                Change::RowsAboutToBeRemoved {
                    parent: None,
                    first: 0,
                    last: 0
                },
                Change::RowsRemoved {
                    parent: None,
                    first: 0,
                    last: 0
                },
                Change::RowsAboutToBeInserted {
                    parent: None,
                    first: 1,
                    last: 2
                },
                Change::RowsInserted {
                    parent: None,
                    first: 1,
                    last: 2
                },
            ]
        );
    }

    #[test]
    fn delete_leaf_only_removes() {
        let mut index = sample();
        let recorder = recorded(&mut index);

        index.delete(&id("A.1")).unwrap();

        let changes = recorder.take();
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[0],
            Change::RowsAboutToBeRemoved {
                parent: Some(id("A")),
                first: 0,
                last: 0
            }
        );
        assert_eq!(index.find(&id("A.2")).unwrap().row(), 0);
    }

    #[test]
    fn delete_missing_fails() {
        let mut index = sample();
        assert_eq!(
            index.delete(&id("Z")).unwrap_err().class(),
            ErrorClass::NotFound
        );
    }

    #[test]
    fn rename_keeps_position_and_children() {
        let mut index = sample();
        let recorder = recorded(&mut index);

        index.rename(&id("A"), id("R")).unwrap();

        let renamed = index.find(&id("R")).unwrap();
        assert_eq!(renamed.row(), 0);
        assert_eq!(ids(renamed.children()), ["A.1", "A.2"]);
        assert!(index.find(&id("A")).is_none());
        assert_eq!(
            index.find(&id("A.1")).unwrap().parent().unwrap().id().as_str(),
            "R"
        );
        assert_eq!(
            recorder.take(),
            [Change::DataChanged {
                parent: None,
                row: 0
            }]
        );
        index.forest.assert_consistent();
    }

    #[test]
    fn rename_child_addresses_its_parent() {
        let mut index = sample();
        let recorder = recorded(&mut index);

        index.rename(&id("A.2"), id("A.9")).unwrap();

        let changes = recorder.take();
        assert_eq!(
            changes,
            [Change::DataChanged {
                parent: Some(id("A")),
                row: 1
            }]
        );
        assert!(changes.iter().all(|c| !c.is_structural()));
    }

    #[test]
    fn rename_to_same_id_only_refreshes_the_row() {
        let mut index = sample();
        let before = index.outline();
        let recorder = recorded(&mut index);

        index.rename(&id("B"), id("B")).unwrap();

        assert_eq!(
            recorder.take(),
            [Change::DataChanged {
                parent: None,
                row: 1
            }]
        );
        assert_eq!(index.outline(), before);
        index.forest.assert_consistent();
    }

    #[test]
    fn unsubscribed_views_stop_receiving_changes() {
        let mut index = sample();
        let recorder = Recorder::default();
        let subscription = index.subscribe(recorder.callback());

        index.rename(&id("B"), id("C")).unwrap();
        assert!(index.unsubscribe(subscription));
        index.rename(&id("C"), id("D")).unwrap();

        assert_eq!(recorder.take().len(), 1);
        assert!(!index.unsubscribe(subscription));
    }

    #[test]
    fn rename_onto_existing_id_fails() {
        let mut index = sample();
        let err = index.rename(&id("A"), id("B")).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId { .. }));
        assert!(index.find(&id("A")).is_some());
    }

    #[test]
    fn rename_missing_fails() {
        let mut index = sample();
        assert_eq!(
            index.rename(&id("Q"), id("R")).unwrap_err().class(),
            ErrorClass::NotFound
        );
    }

    #[test]
    fn reparent_moves_subtree() {
        let mut index = sample();
        let recorder = recorded(&mut index);

        index.reparent(&id("A"), Some(&id("B"))).unwrap();

        assert_eq!(ids(index.top_level()), ["B"]);
        let a = index.find(&id("A")).unwrap();
        assert_eq!(a.parent().unwrap().id().as_str(), "B");
        assert_eq!(ids(a.children()), ["A.1", "A.2"]);
        assert_eq!(index.find(&id("A.2")).unwrap().depth(), 2);

        let changes = recorder.take();
        assert_eq!(
            changes[0],
            Change::RowsAboutToBeRemoved {
                parent: None,
                first: 0,
                last: 0
            }
        );
        assert_eq!(
            changes[3],
            Change::RowsInserted {
                parent: Some(id("B")),
                first: 0,
                last: 0
            }
        );
        index.forest.assert_consistent();
    }

    #[test]
    fn reparent_to_top_level() {
        let mut index = sample();
        index.reparent(&id("A.1"), None).unwrap();

        assert_eq!(ids(index.top_level()), ["A", "B", "A.1"]);
        assert!(index.find(&id("A.1")).unwrap().is_top_level());
    }

    #[test]
    fn reparent_to_current_parent_is_silent() {
        let mut index = sample();
        let recorder = recorded(&mut index);

        index.reparent(&id("A.1"), Some(&id("A"))).unwrap();

        assert!(recorder.take().is_empty());
        assert_eq!(ids(index.find(&id("A")).unwrap().children()), ["A.1", "A.2"]);
    }

    #[test_case("A", "A"; "under itself")]
    #[test_case("A", "A.1"; "under its child")]
    fn reparent_rejects_cycles(item: &str, parent: &str) {
        let mut index = sample();
        let before = index.outline();

        let err = index.reparent(&id(item), Some(&id(parent))).unwrap_err();

        assert!(matches!(err, IndexError::Cycle { .. }));
        assert_eq!(err.class(), ErrorClass::InvalidOperation);
        assert_eq!(index.outline(), before);
    }

    #[test]
    fn reparent_missing_parent_fails() {
        let mut index = sample();
        let err = index.reparent(&id("A.1"), Some(&id("Q"))).unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn flat_index_stays_flat() {
        let mut index = ItemIndex::new(EntityKind::Test);
        index.append_child_to_parent(id("T1"), None).unwrap();
        index.append_child_to_parent(id("T2"), None).unwrap();

        let err = index
            .append_child_to_parent(id("T3"), Some(&id("T1")))
            .unwrap_err();
        assert!(matches!(err, IndexError::NotHierarchical { .. }));

        let err = index.reparent(&id("T2"), None).unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidOperation);

        index.delete(&id("T1")).unwrap();
        assert_eq!(ids(index.top_level()), ["T2"]);
    }

    #[test]
    fn view_queries() {
        let index = sample();
        assert_eq!(index.row_count(None).unwrap(), 2);
        assert_eq!(index.row_count(Some(&id("A"))).unwrap(), 2);
        assert!(index.row_count(Some(&id("Q"))).is_err());
        assert_eq!(
            index.child_at(Some(&id("A")), 1).unwrap().id().as_str(),
            "A.2"
        );
        assert!(index.child_at(None, 2).is_none());
        assert_eq!(ids(index.iter()), ["A", "A.1", "A.2", "B"]);
    }

    fn store_fixture() -> FixtureStore {
        // Deliberately unsorted.
        FixtureStore::default()
            .with_item(EntityKind::Requirement, "B", None)
            .with_item(EntityKind::Requirement, "A", None)
            .with_item(EntityKind::Requirement, "A.2", Some("A"))
            .with_item(EntityKind::Requirement, "A.1", Some("A"))
            .with_item(EntityKind::Requirement, "A.1.b", Some("A.1"))
            .with_item(EntityKind::Requirement, "A.1.a", Some("A.1"))
            .with_item(EntityKind::Test, "T2", None)
            .with_item(EntityKind::Test, "T1", None)
    }

    #[test]
    fn initialize_sorts_siblings() {
        let index = ItemIndex::load(EntityKind::Requirement, &store_fixture()).unwrap();

        assert_eq!(ids(index.top_level()), ["A", "B"]);
        let a1 = index.find(&id("A.1")).unwrap();
        assert_eq!(ids(a1.children()), ["A.1.a", "A.1.b"]);
        assert_eq!(index.len(), 6);
        index.forest.assert_consistent();
    }

    #[test]
    fn initialize_twice_is_stable() {
        let store = store_fixture();
        let mut index = ItemIndex::load(EntityKind::Requirement, &store).unwrap();
        let first = index.outline();

        index.initialize(&store).unwrap();

        assert_eq!(index.outline(), first);
    }

    #[test]
    fn initialize_replaces_local_edits_and_notifies_reset() {
        let store = store_fixture();
        let mut index = ItemIndex::load(EntityKind::Requirement, &store).unwrap();
        index.append_child_to_parent(id("LOCAL"), None).unwrap();
        let recorder = recorded(&mut index);

        index.initialize(&store).unwrap();

        assert!(index.find(&id("LOCAL")).is_none());
        assert_eq!(recorder.take(), [Change::AboutToReset, Change::Reset]);
    }

    #[test]
    fn initialize_flat_kind() {
        let index = ItemIndex::load(EntityKind::Test, &store_fixture()).unwrap();
        assert_eq!(ids(index.top_level()), ["T1", "T2"]);
    }

    #[test]
    fn initialize_rejects_cyclic_store_and_keeps_old_forest() {
        let store = store_fixture()
            .with_item(EntityKind::Requirement, "X", None)
            .with_child_override(EntityKind::Requirement, "X", "A");
        let mut index = sample();
        let before = index.outline();

        let err = index.initialize(&store).unwrap_err();

        assert!(matches!(err, IndexError::InconsistentStore { .. }));
        assert_eq!(index.outline(), before);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append { id: u8, parent: Option<u8> },
        Delete(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..24, proptest::option::of(0u8..24))
                .prop_map(|(id, parent)| Op::Append { id, parent }),
            (0u8..24).prop_map(Op::Delete),
        ]
    }

    fn item(n: u8) -> ItemId {
        id(&format!("R{n:02}"))
    }

    proptest! {
        #[test]
        fn find_tracks_appends_and_deletes(ops in proptest::collection::vec(op(), 0..64)) {
            let mut index = ItemIndex::new(EntityKind::Requirement);
            let mut present = std::collections::BTreeSet::new();

            for op in ops {
                match op {
                    Op::Append { id, parent } => {
                        let parent = parent.filter(|p| present.contains(p));
                        if present.contains(&id) {
                            continue;
                        }
                        index
                            .append_child_to_parent(item(id), parent.map(item).as_ref())
                            .unwrap();
                        present.insert(id);
                    }
                    Op::Delete(id) => {
                        let result = index.delete(&item(id));
                        prop_assert_eq!(result.is_ok(), present.remove(&id));
                    }
                }

                index.forest.assert_consistent();
                for n in 0u8..24 {
                    prop_assert_eq!(index.find(&item(n)).is_some(), present.contains(&n));
                }
                prop_assert_eq!(index.len(), present.len());
            }
        }
    }
}
