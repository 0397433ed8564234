//! Version vectors and dots.
//!
//! A [`Dot`] is a single `(writer, counter)` assignment. A [`VersionVector`]
//! is the per-writer high-water mark a replica has observed. Both are pure,
//! side-effect free, and serialize deterministically (sorted by writer).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A version marker for a single writer: `counter` is 1-based and
/// monotonically increasing per writer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot<W> {
    pub writer: W,
    pub counter: u64,
}

impl<W> Dot<W> {
    pub fn new(writer: W, counter: u64) -> Self {
        Self { writer, counter }
    }
}

impl<W: Ord + Clone> Dot<W> {
    /// Returns the next dot for the same writer.
    pub fn inc(&self) -> Self {
        Self {
            writer: self.writer.clone(),
            counter: self.counter + 1,
        }
    }
}

/// A mapping `writer -> highest counter observed`, stored in sorted order
/// so that two semantically equal vectors always serialize to the same
/// bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VersionVector<W: Ord> {
    entries: BTreeMap<W, u64>,
}

impl<W: Ord + Clone> VersionVector<W> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The counter observed for `writer`, or 0 if the writer has never been
    /// observed.
    pub fn get(&self, writer: &W) -> u64 {
        self.entries.get(writer).copied().unwrap_or(0)
    }

    /// `covers(vv, dot) <=> vv[dot.writer] >= dot.counter`.
    pub fn covers(&self, dot: &Dot<W>) -> bool {
        self.get(&dot.writer) >= dot.counter
    }

    /// Raises the watermark for `writer` to `counter` if it is higher than
    /// what is currently recorded. Never lowers a watermark.
    pub fn observe(&mut self, writer: W, counter: u64) {
        let entry = self.entries.entry(writer).or_insert(0);
        if counter > *entry {
            *entry = counter;
        }
    }

    /// Point-wise max of two version vectors.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (writer, counter) in &other.entries {
            merged.observe(writer.clone(), *counter);
        }
        merged
    }

    /// The highest counter across all writers, or 0 if empty. Used to
    /// derive `patch.lamport = 1 + max(observedFrontier)`.
    pub fn max(&self) -> u64 {
        self.entries.values().copied().max().unwrap_or(0)
    }

    /// Iterates writers in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&W, u64)> {
        self.entries.iter().map(|(w, c)| (w, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn writers(&self) -> impl Iterator<Item = &W> {
        self.entries.keys()
    }
}

impl<W: Ord + Clone> FromIterator<(W, u64)> for VersionVector<W> {
    fn from_iter<T: IntoIterator<Item = (W, u64)>>(iter: T) -> Self {
        let mut vv = VersionVector::new();
        for (w, c) in iter {
            vv.observe(w, c);
        }
        vv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_vv() -> impl Strategy<Value = VersionVector<u8>> {
        prop::collection::btree_map(0u8..5, 1u64..20, 0..5).prop_map(|m| m.into_iter().collect())
    }

    #[test]
    fn covers_respects_watermark() {
        let mut vv = VersionVector::new();
        vv.observe("alice", 3);
        assert!(vv.covers(&Dot::new("alice", 1)));
        assert!(vv.covers(&Dot::new("alice", 3)));
        assert!(!vv.covers(&Dot::new("alice", 4)));
        assert!(!vv.covers(&Dot::new("bob", 1)));
    }

    #[test]
    fn observe_never_lowers() {
        let mut vv = VersionVector::new();
        vv.observe("alice", 5);
        vv.observe("alice", 2);
        assert_eq!(vv.get(&"alice"), 5);
    }

    #[test]
    fn merge_is_pointwise_max() {
        let mut a = VersionVector::new();
        a.observe("alice", 3);
        let mut b = VersionVector::new();
        b.observe("alice", 1);
        b.observe("bob", 7);
        let merged = a.merge(&b);
        assert_eq!(merged.get(&"alice"), 3);
        assert_eq!(merged.get(&"bob"), 7);
    }

    proptest! {
        #[test]
        fn merge_idempotent(v in arb_vv()) {
            prop_assert_eq!(v.merge(&v), v);
        }

        #[test]
        fn merge_commutative(a in arb_vv(), b in arb_vv()) {
            prop_assert_eq!(a.merge(&b), b.merge(&a));
        }

        #[test]
        fn merge_associative(a in arb_vv(), b in arb_vv(), c in arb_vv()) {
            prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
        }
    }
}
