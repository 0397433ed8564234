//! Provenance payloads: an ordered, monoidal log of `(commit, patch)` pairs
//! that can be concatenated and replayed independently of the object store
//! satisfying the monoid laws (identity, associativity).

use crate::codec;
use crate::error::Result;
use crate::ids::CommitId;
use crate::patch::Patch;
use crate::reducer;
use crate::state::GraphState;
use serde::{Deserialize, Serialize};

/// One patch and the commit it was read from, in application order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub commit_id: CommitId,
    pub patch: Patch,
}

/// An ordered sequence of patches forming a monoid under [`concat`]:
/// `identity()` is the two-sided identity, and `concat` is associative.
/// Replaying a payload is equivalent to [`reducer::apply_patches`] over its
/// entries in order.
///
/// [`concat`]: ProvenancePayload::concat
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProvenancePayload {
    entries: Vec<ProvenanceEntry>,
}

impl ProvenancePayload {
    /// The monoid identity: an empty payload.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ProvenanceEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, commit_id: CommitId, patch: Patch) {
        self.entries.push(ProvenanceEntry { commit_id, patch });
    }

    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Concatenates `self` followed by `other`. Short-circuits on either
    /// side being the identity so that repeated concatenation of mostly
    /// empty payloads (the common case when folding per-writer deltas)
    /// avoids needless cloning.
    pub fn concat(&self, other: &Self) -> Self {
        if self.entries.is_empty() {
            return other.clone();
        }
        if other.entries.is_empty() {
            return self.clone();
        }
        let mut entries = Vec::with_capacity(self.entries.len() + other.entries.len());
        entries.extend_from_slice(&self.entries);
        entries.extend_from_slice(&other.entries);
        Self { entries }
    }

    /// Folds every entry into `initial_state` (or a fresh [`GraphState`] if
    /// `None`) via [`reducer::apply_patch`], in order.
    pub fn replay(&self, initial_state: Option<GraphState>) -> Result<GraphState> {
        let mut state = initial_state.unwrap_or_default();
        let pairs = self.entries.iter().map(|e| (&e.patch, &e.commit_id));
        reducer::apply_patches(&mut state, pairs)?;
        Ok(state)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Dot, VersionVector};
    use crate::ids::WriterId;
    use crate::patch::Op;

    fn cid(n: u8) -> CommitId {
        CommitId::new(format!("{:040x}", n)).unwrap()
    }

    fn writer(name: &str) -> WriterId {
        WriterId::new(name).unwrap()
    }

    fn sample_payload(node: &str, writer_name: &str, n: u8) -> ProvenancePayload {
        let mut payload = ProvenancePayload::identity();
        let patch = Patch::new(
            writer(writer_name),
            VersionVector::new(),
            vec![Op::NodeAdd {
                node: node.to_string(),
                dot: Dot::new(writer(writer_name), 1),
            }],
        );
        payload.push(cid(n), patch);
        payload
    }

    #[test]
    fn left_and_right_identity() {
        let p = sample_payload("a", "alice", 1);
        assert_eq!(ProvenancePayload::identity().concat(&p), p);
        assert_eq!(p.concat(&ProvenancePayload::identity()), p);
    }

    #[test]
    fn concat_is_associative_by_bytes_and_replay() {
        let a = sample_payload("a", "alice", 1);
        let b = sample_payload("b", "bob", 2);
        let c = sample_payload("c", "carol", 3);

        let left = a.concat(&b).concat(&c);
        let right = a.concat(&b.concat(&c));
        assert_eq!(left.to_binary().unwrap(), right.to_binary().unwrap());

        let left_state = left.replay(None).unwrap();
        let right_state = right.replay(None).unwrap();
        let left_nodes: std::collections::BTreeSet<_> = left_state.nodes().cloned().collect();
        let right_nodes: std::collections::BTreeSet<_> = right_state.nodes().cloned().collect();
        assert_eq!(left_nodes, right_nodes);
    }

    #[test]
    fn binary_round_trips() {
        let payload = sample_payload("a", "alice", 1).concat(&sample_payload("b", "bob", 2));
        let bytes = payload.to_binary().unwrap();
        let decoded = ProvenancePayload::from_binary(&bytes).unwrap();
        assert_eq!(payload, decoded);
    }

    #[test]
    fn replay_onto_existing_state_extends_it() {
        let base = sample_payload("a", "alice", 1)
            .replay(None)
            .unwrap();
        let extended = sample_payload("b", "bob", 2).replay(Some(base)).unwrap();
        let nodes: std::collections::BTreeSet<_> = extended.nodes().cloned().collect();
        assert!(nodes.contains("a"));
        assert!(nodes.contains("b"));
    }
}
