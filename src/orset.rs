//! Observed-remove set with dots.
//!
//! Each tracked identity (a node id, an edge key) owns a pair of dot sets:
//! the dots that added it (`value_dots`) and the dots that observed-and-
//! removed it (`tombstones`). The identity is alive iff
//! `value_dots \ tombstones` is non-empty.

use crate::clock::Dot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
struct EntryState<W: Ord> {
    value_dots: BTreeSet<Dot<W>>,
    tombstones: BTreeSet<Dot<W>>,
}

impl<W: Ord + Clone> EntryState<W> {
    fn is_alive(&self) -> bool {
        self.value_dots.difference(&self.tombstones).next().is_some()
    }
}

/// An observed-remove set keyed by an arbitrary `Id`, with dots from writer
/// type `W`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ORSet<Id: Ord, W: Ord> {
    entries: std::collections::BTreeMap<Id, EntryState<W>>,
}

impl<Id: Ord + Clone, W: Ord + Clone> ORSet<Id, W> {
    pub fn new() -> Self {
        Self {
            entries: Default::default(),
        }
    }

    /// Adds `dot` to the identity's value-dots, making it alive.
    pub fn add(&mut self, id: Id, dot: Dot<W>) {
        self.entries.entry(id).or_default().value_dots.insert(dot);
    }

    /// Moves the given observed dots to the identity's tombstone set. An
    /// identity may be removed (tombstoned) even if it does not currently
    /// exist locally — the tombstones still apply once the corresponding
    /// `add` is observed (standard OR-Set delta commutativity).
    pub fn remove(&mut self, id: Id, observed_dots: impl IntoIterator<Item = Dot<W>>) {
        let entry = self.entries.entry(id).or_default();
        for dot in observed_dots {
            entry.tombstones.insert(dot);
        }
    }

    /// `contains(id) <=> |value_dots \ tombstones| >= 1`.
    pub fn contains(&self, id: &Id) -> bool {
        self.entries.get(id).map(EntryState::is_alive).unwrap_or(false)
    }

    /// The dots currently making `id` alive (`value_dots \ tombstones`),
    /// i.e. the `observed_dots` a caller must tombstone to remove it.
    pub fn alive_dots(&self, id: &Id) -> Vec<Dot<W>> {
        self.entries
            .get(id)
            .map(|state| state.value_dots.difference(&state.tombstones).cloned().collect())
            .unwrap_or_default()
    }

    /// Iterates the identities currently alive, in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Id> {
        self.entries
            .iter()
            .filter(|(_, state)| state.is_alive())
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Unions both the value-dots and tombstones of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (id, state) in &other.entries {
            let entry = self.entries.entry(id.clone()).or_default();
            entry.value_dots.extend(state.value_dots.iter().cloned());
            entry.tombstones.extend(state.tombstones.iter().cloned());
        }
    }

    /// Tombstones `observed_dots` wherever they appear among any identity's
    /// value-dots, without requiring the caller to know which identity they
    /// belong to. An identity becomes absent once every current value-dot
    /// has been tombstoned this way.
    pub fn remove_observed_dots(&mut self, observed_dots: impl IntoIterator<Item = Dot<W>>) {
        for dot in observed_dots {
            for state in self.entries.values_mut() {
                if state.value_dots.contains(&dot) {
                    state.tombstones.insert(dot.clone());
                }
            }
        }
    }

    /// All dots (value and tombstone) across every identity, for the
    /// frontier-coverage invariant: every dot this set has ever produced
    /// must be covered by the observed frontier.
    pub fn all_dots(&self) -> impl Iterator<Item = &Dot<W>> {
        self.entries.values().flat_map(|state| {
            state.value_dots.iter().chain(state.tombstones.iter())
        })
    }
}
