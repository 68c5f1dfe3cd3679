//! Toggleable membership lists for many-to-many associations.
//!
//! An [`AssociationSet`] stages which targets are linked to one owner (for
//! example which use cases a requirement refers to) while the owner is being
//! edited. It never writes to the store; the caller hands
//! [`AssociationSet::associated_ids`] to the store when the owner is saved.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    domain::{
        change::{Change, Notifier, SubscriptionId},
        IndexError, ItemId, Relation,
    },
    storage::{Store, StoreError},
};

/// An item that can be associated, with its description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// The item's identifier.
    pub id: ItemId,
    /// The item's description.
    pub description: String,
}

impl Candidate {
    /// Creates a new candidate.
    pub fn new(id: ItemId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
        }
    }
}

/// The staged set of targets associated with one owner.
///
/// The candidate list is a snapshot taken at construction and is never
/// refreshed.
pub struct AssociationSet {
    relation: Relation,
    owner: ItemId,
    candidates: Vec<Candidate>,
    associated: BTreeSet<ItemId>,
    owner_deleted: bool,
    notifier: Notifier,
}

impl AssociationSet {
    /// Creates a set from a candidate snapshot and the current membership.
    #[must_use]
    pub fn new(
        relation: Relation,
        owner: ItemId,
        candidates: Vec<Candidate>,
        associated: BTreeSet<ItemId>,
    ) -> Self {
        Self {
            relation,
            owner,
            candidates,
            associated,
            owner_deleted: false,
            notifier: Notifier::default(),
        }
    }

    /// Reads the candidates and the owner's current associations from the
    /// store.
    ///
    /// # Errors
    ///
    /// Returns an error if either store query fails.
    #[instrument(skip(store))]
    pub fn load<S: Store + ?Sized>(
        store: &S,
        relation: Relation,
        owner: ItemId,
    ) -> Result<Self, StoreError> {
        let candidates = store.candidate_list(relation.target())?;
        let associated = store.associated_ids(relation, &owner)?;
        tracing::debug!(
            candidates = candidates.len(),
            associated = associated.len(),
            "loaded association set"
        );
        Ok(Self::new(relation, owner, candidates, associated))
    }

    /// The association this set stages.
    #[must_use]
    pub const fn relation(&self) -> Relation {
        self.relation
    }

    /// The item whose associations are being edited.
    #[must_use]
    pub const fn owner(&self) -> &ItemId {
        &self.owner
    }

    /// Every item that could be associated, in the order the store supplied.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Returns `true` if `id` is currently in the set.
    #[must_use]
    pub fn is_associated(&self, id: &ItemId) -> bool {
        self.associated.contains(id)
    }

    /// Sets whether `id` is associated with the owner.
    ///
    /// Returns `true` and emits [`Change::DataChanged`] for the candidate's
    /// row if the membership changed; returns `false` without notifying if it
    /// already had the requested state.
    ///
    /// # Errors
    ///
    /// - [`IndexError::OwnerDeleted`] once [`Self::mark_owner_deleted`] has
    ///   been called
    /// - [`IndexError::NotFound`] if `id` is not among the candidates
    #[instrument(skip(self), fields(relation = %self.relation, owner = %self.owner))]
    pub fn toggle(&mut self, id: &ItemId, associated: bool) -> Result<bool, IndexError> {
        if self.owner_deleted {
            return Err(IndexError::OwnerDeleted {
                kind: self.relation.owner(),
                owner: self.owner.clone(),
            });
        }

        let row = self
            .candidates
            .iter()
            .position(|candidate| &candidate.id == id)
            .ok_or_else(|| IndexError::NotFound {
                kind: self.relation.target(),
                id: id.clone(),
            })?;

        let changed = if associated {
            self.associated.insert(id.clone())
        } else {
            self.associated.remove(id)
        };

        if changed {
            self.notifier
                .emit(&Change::DataChanged { parent: None, row });
        }
        Ok(changed)
    }

    /// The identifiers currently in the set.
    #[must_use]
    pub fn associated_ids(&self) -> &BTreeSet<ItemId> {
        &self.associated
    }

    /// Records that the owner has been deleted. Later toggles fail.
    pub fn mark_owner_deleted(&mut self) {
        self.owner_deleted = true;
    }

    /// Returns `true` once the owner has been deleted.
    #[must_use]
    pub const fn is_owner_deleted(&self) -> bool {
        self.owner_deleted
    }

    /// Registers a callback invoked whenever a toggle changes membership.
    pub fn subscribe(&mut self, callback: impl FnMut(&Change) + 'static) -> SubscriptionId {
        self.notifier.subscribe(callback)
    }

    /// Removes a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

impl fmt::Debug for AssociationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationSet")
            .field("relation", &self.relation)
            .field("owner", &self.owner)
            .field("candidates", &self.candidates.len())
            .field("associated", &self.associated)
            .field("owner_deleted", &self.owner_deleted)
            .finish_non_exhaustive()
    }
}
