//! Change notifications for views observing an index.
//!
//! Structural changes are bracketed by an "about to" event and a completion
//! event, and are addressed by the parent's identifier plus a row range among
//! that parent's children. `parent: None` addresses the top-level list.

use std::fmt;

use crate::domain::ItemId;

/// A change to an index, as seen by an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The whole index is about to be rebuilt.
    AboutToReset,
    /// The index has been rebuilt.
    Reset,
    /// Rows `first..=last` are about to be inserted under `parent`.
    RowsAboutToBeInserted {
        /// The parent the rows are inserted under.
        parent: Option<ItemId>,
        /// The first inserted row.
        first: usize,
        /// The last inserted row (inclusive).
        last: usize,
    },
    /// Rows `first..=last` have been inserted under `parent`.
    RowsInserted {
        /// The parent the rows were inserted under.
        parent: Option<ItemId>,
        /// The first inserted row.
        first: usize,
        /// The last inserted row (inclusive).
        last: usize,
    },
    /// Rows `first..=last` are about to be removed from under `parent`.
    RowsAboutToBeRemoved {
        /// The parent the rows are removed from.
        parent: Option<ItemId>,
        /// The first removed row.
        first: usize,
        /// The last removed row (inclusive).
        last: usize,
    },
    /// Rows `first..=last` have been removed from under `parent`.
    RowsRemoved {
        /// The parent the rows were removed from.
        parent: Option<ItemId>,
        /// The first removed row.
        first: usize,
        /// The last removed row (inclusive).
        last: usize,
    },
    /// The data shown for one row changed; the structure did not.
    DataChanged {
        /// The parent of the changed row.
        parent: Option<ItemId>,
        /// The changed row.
        row: usize,
    },
}

impl Change {
    /// Returns `true` for events that change the shape of the index.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        !matches!(self, Self::DataChanged { .. })
    }
}

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&Change)>;

/// Fan-out of change events to registered callbacks.
#[derive(Default)]
pub(crate) struct Notifier {
    next: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
}

impl Notifier {
    pub(crate) fn subscribe(&mut self, callback: impl FnMut(&Change) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    pub(crate) fn emit(&mut self, change: &Change) {
        tracing::trace!(?change, "notifying {} subscribers", self.subscribers.len());
        for (_, callback) in &mut self.subscribers {
            callback(change);
        }
    }

    /// Emits the "about to insert" and "inserted" pair around `splice`.
    pub(crate) fn inserting<T>(
        &mut self,
        parent: Option<&ItemId>,
        first: usize,
        last: usize,
        splice: impl FnOnce() -> T,
    ) -> T {
        self.emit(&Change::RowsAboutToBeInserted {
            parent: parent.cloned(),
            first,
            last,
        });
        let out = splice();
        self.emit(&Change::RowsInserted {
            parent: parent.cloned(),
            first,
            last,
        });
        out
    }

    /// Emits the "about to remove" and "removed" pair around `splice`.
    pub(crate) fn removing<T>(
        &mut self,
        parent: Option<&ItemId>,
        first: usize,
        last: usize,
        splice: impl FnOnce() -> T,
    ) -> T {
        self.emit(&Change::RowsAboutToBeRemoved {
            parent: parent.cloned(),
            first,
            last,
        });
        let out = splice();
        self.emit(&Change::RowsRemoved {
            parent: parent.cloned(),
            first,
            last,
        });
        out
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
