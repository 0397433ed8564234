//! Tracks which patches read or wrote each entity key, and computes a
//! causal cone for slice materialization.

use crate::codec;
use crate::error::Result;
use crate::ids::CommitId;
use crate::patch::Patch;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maps an entity key to the ordered (by insertion) commit-ids of patches
/// that read or wrote it. Patches authored before provenance tracking
/// existed (no `reads`/`writes`) contribute nothing — this is correct
/// behavior, not an error.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceIndex {
    by_key: BTreeMap<String, Vec<CommitId>>,
}

impl ProvenanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `commit_id` against every key in `reads ∪ writes`. A no-op
    /// if both are empty.
    pub fn add_patch(&mut self, commit_id: CommitId, reads: &[String], writes: &[String]) {
        let mut keys: BTreeSet<&String> = reads.iter().collect();
        keys.extend(writes.iter());
        for key in keys {
            let entries = self.by_key.entry(key.clone()).or_default();
            if !entries.contains(&commit_id) {
                entries.push(commit_id.clone());
            }
        }
    }

    /// The commit-ids of patches touching `entity_key`, in insertion order.
    pub fn patches_for(&self, entity_key: &str) -> &[CommitId] {
        self.by_key
            .get(entity_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }
}

/// Computes the causal cone for a seed entity key: the transitive closure
/// of patches reachable by following `reads ∪ writes` from patches that
/// touch keys already in the cone. `patch_lookup` resolves a commit-id to
/// its decoded patch (and must be total over every commit-id the index
/// references).
///
/// Returns patches ordered by `(writer, lamport)` causal order, ready for
/// replay.
pub fn causal_cone<'a>(
    index: &ProvenanceIndex,
    seed: &str,
    patch_lookup: impl Fn(&CommitId) -> Option<&'a Patch>,
) -> Vec<(CommitId, &'a Patch)> {
    let mut cone: BTreeSet<CommitId> = BTreeSet::new();
    let mut seen_keys: BTreeSet<String> = BTreeSet::new();
    let mut pending: Vec<String> = vec![seed.to_string()];

    while let Some(key) = pending.pop() {
        if !seen_keys.insert(key.clone()) {
            continue;
        }
        for commit_id in index.patches_for(&key) {
            if cone.contains(commit_id) {
                continue;
            }
            let Some(patch) = patch_lookup(commit_id) else {
                continue;
            };
            cone.insert(commit_id.clone());
            if let Some(reads) = &patch.reads {
                pending.extend(reads.iter().cloned());
            }
            if let Some(writes) = &patch.writes {
                pending.extend(writes.iter().cloned());
            }
        }
    }

    let mut result: Vec<(CommitId, &Patch)> = cone
        .into_iter()
        .filter_map(|commit_id| patch_lookup(&commit_id).map(|patch| (commit_id, patch)))
        .collect();
    result.sort_by(|(_, a), (_, b)| (a.writer.clone(), a.lamport).cmp(&(b.writer.clone(), b.lamport)));
    result
}
