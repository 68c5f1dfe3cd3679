//! Arena-backed forest of item identifiers.
//!
//! Nodes live in a slot vector and refer to each other by [`NodeId`] handle.
//! Every routine that touches a parent/child relation updates both sides
//! before returning, so `child ∈ parent.children ⇔ child.parent == parent`
//! holds between calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::ItemId;

/// Handle to a node slot in a [`Forest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct NodeId(usize);

#[derive(Debug, Clone)]
struct Slot {
    id: ItemId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Forest {
    slots: Vec<Option<Slot>>,
    /// Freed slot indices, reused before the vector grows.
    vacant: Vec<usize>,
    roots: Vec<NodeId>,
    /// Identifier lookup. Kept in step with the slots on every mutation.
    lookup: BTreeMap<ItemId, NodeId>,
}

impl Forest {
    pub(crate) fn len(&self) -> usize {
        self.lookup.len()
    }

    pub(crate) fn find(&self, id: &ItemId) -> Option<NodeId> {
        self.lookup.get(id).copied()
    }

    pub(crate) fn contains(&self, id: &ItemId) -> bool {
        self.lookup.contains_key(id)
    }

    // Handles are only created by `push` and dropped from every list by
    // `remove`, so a stale handle here is a bug in this module.
    fn slot(&self, node: NodeId) -> &Slot {
        self.slots[node.0]
            .as_ref()
            .unwrap_or_else(|| panic!("stale node handle {node:?}"))
    }

    fn slot_mut(&mut self, node: NodeId) -> &mut Slot {
        self.slots[node.0]
            .as_mut()
            .unwrap_or_else(|| panic!("stale node handle {node:?}"))
    }

    pub(crate) fn id(&self, node: NodeId) -> &ItemId {
        &self.slot(node).id
    }

    pub(crate) fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.slot(node).parent
    }

    pub(crate) fn children(&self, node: NodeId) -> &[NodeId] {
        &self.slot(node).children
    }

    pub(crate) fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// The sibling list `node` would be found in under `parent`.
    pub(crate) fn siblings(&self, parent: Option<NodeId>) -> &[NodeId] {
        parent.map_or(self.roots.as_slice(), |p| self.children(p))
    }

    /// Position of `node` among its siblings.
    ///
    /// Panics if the parent/child links are out of step.
    pub(crate) fn row(&self, node: NodeId) -> usize {
        self.siblings(self.parent(node))
            .iter()
            .position(|&n| n == node)
            .unwrap_or_else(|| panic!("node {node:?} missing from its parent's children"))
    }

    pub(crate) fn depth(&self, node: NodeId) -> usize {
        self.ancestors(node).count()
    }

    pub(crate) fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), |&n| self.parent(n))
    }

    /// Returns `true` if `ancestor` is `node` or lies on its path to the root.
    pub(crate) fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|n| n == ancestor)
    }

    /// Adds a leaf at the end of `parent`'s children (or of the top level).
    ///
    /// The caller guarantees `id` is not already present.
    pub(crate) fn push(&mut self, id: ItemId, parent: Option<NodeId>) -> NodeId {
        debug_assert!(!self.contains(&id), "duplicate id {id}");
        let slot = Slot {
            id: id.clone(),
            parent: None,
            children: Vec::new(),
        };
        let node = if let Some(index) = self.vacant.pop() {
            self.slots[index] = Some(slot);
            NodeId(index)
        } else {
            self.slots.push(Some(slot));
            NodeId(self.slots.len() - 1)
        };
        self.lookup.insert(id, node);
        self.attach(node, parent);
        node
    }

    /// Appends a detached node to `parent`'s children (or to the top level).
    pub(crate) fn attach(&mut self, node: NodeId, parent: Option<NodeId>) {
        debug_assert!(self.parent(node).is_none());
        match parent {
            Some(p) => {
                self.slot_mut(p).children.push(node);
                self.slot_mut(node).parent = Some(p);
            }
            None => self.roots.push(node),
        }
    }

    /// Unlinks `node` from its parent (or the top level), returning the row it
    /// occupied. The node keeps its own children.
    pub(crate) fn detach(&mut self, node: NodeId) -> usize {
        let row = self.row(node);
        match self.slot_mut(node).parent.take() {
            Some(p) => {
                self.slot_mut(p).children.remove(row);
            }
            None => {
                self.roots.remove(row);
            }
        }
        row
    }

    /// Detaches and frees `node`, returning its former children.
    ///
    /// The returned children are detached: their parent is cleared and they
    /// sit in no sibling list until the caller attaches them.
    pub(crate) fn remove(&mut self, node: NodeId) -> Vec<NodeId> {
        self.detach(node);
        let Some(slot) = self.slots[node.0].take() else {
            return Vec::new();
        };
        self.vacant.push(node.0);
        self.lookup.remove(&slot.id);
        for &child in &slot.children {
            self.slot_mut(child).parent = None;
        }
        slot.children
    }

    /// Changes the identifier of `node`, keeping its place in the forest.
    ///
    /// The caller guarantees `new_id` is not held by another node.
    pub(crate) fn rename(&mut self, node: NodeId, new_id: ItemId) {
        let old_id = std::mem::replace(&mut self.slot_mut(node).id, new_id.clone());
        self.lookup.remove(&old_id);
        self.lookup.insert(new_id, node);
    }

    /// Pre-order walk over every node.
    pub(crate) fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(self.children(node).iter().rev());
            Some(node)
        })
    }

    pub(crate) fn outline(&self) -> Outline {
        Outline(self.roots.iter().map(|&n| self.outline_node(n)).collect())
    }

    fn outline_node(&self, node: NodeId) -> OutlineNode {
        OutlineNode {
            id: self.id(node).clone(),
            children: self
                .children(node)
                .iter()
                .map(|&c| self.outline_node(c))
                .collect(),
        }
    }
}

/// An owned snapshot of a forest's identifiers and shape.
///
/// Two outlines are equal when they hold the same identifiers in the same
/// structure and sibling order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outline(pub Vec<OutlineNode>);

impl Outline {
    /// The top-level identifiers, in order.
    #[must_use]
    pub fn top_level_ids(&self) -> Vec<&str> {
        self.0.iter().map(|node| node.id.as_str()).collect()
    }
}

/// One node of an [`Outline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    /// The node's identifier.
    pub id: ItemId,
    /// The node's children, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
}

#[cfg(test)]
impl Forest {
    /// Checks the structural invariants, panicking on the first violation.
    pub(crate) fn assert_consistent(&self) {
        let mut reachable = 0;
        for node in self.iter() {
            reachable += 1;
            let slot = self.slot(node);
            assert_eq!(self.find(&slot.id), Some(node), "lookup out of step for {}", slot.id);
            assert!(
                self.siblings(slot.parent).contains(&node),
                "{} missing from its parent's children",
                slot.id
            );
            for &child in &slot.children {
                assert_eq!(self.parent(child), Some(node));
            }
        }
        assert_eq!(reachable, self.lookup.len(), "unreachable or leaked nodes");
        let live = self.slots.iter().filter(|s| s.is_some()).count();
        assert_eq!(live, reachable);
    }
}
