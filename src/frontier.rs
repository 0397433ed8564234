//! A frontier is the set of chain tips a replica has observed, one per
//! writer.

use crate::ids::{CommitId, WriterId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Frontier {
    tips: BTreeMap<WriterId, CommitId>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tip(&self, writer: &WriterId) -> Option<&CommitId> {
        self.tips.get(writer)
    }

    pub fn set_tip(&mut self, writer: WriterId, commit: CommitId) {
        self.tips.insert(writer, commit);
    }

    pub fn writers(&self) -> impl Iterator<Item = &WriterId> {
        self.tips.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WriterId, &CommitId)> {
        self.tips.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tips.is_empty()
    }
}

impl FromIterator<(WriterId, CommitId)> for Frontier {
    fn from_iter<T: IntoIterator<Item = (WriterId, CommitId)>>(iter: T) -> Self {
        Self {
            tips: iter.into_iter().collect(),
        }
    }
}

/// A chain range a replica still needs: `from` is exclusive (`None` means
/// "from the root").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NeededRange {
    pub writer: WriterId,
    pub from: Option<CommitId>,
    pub to: CommitId,
}

/// The outcome of comparing two frontiers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SyncDelta {
    pub need_from_remote: Vec<NeededRange>,
    pub need_from_local: Vec<NeededRange>,
    pub new_writers_for_local: Vec<WriterId>,
    pub new_writers_for_remote: Vec<WriterId>,
}

/// Compares `local` against `remote` and reports what each side needs from
/// the other. For a writer present on both sides with differing tips, the
/// protocol assumes at most one side is ahead (true for single-producer
/// writers); divergence, if the assumption is violated, surfaces downstream
/// during range loading rather than here.
pub fn compute_sync_delta(local: &Frontier, remote: &Frontier) -> SyncDelta {
    let mut delta = SyncDelta::default();

    for (writer, remote_tip) in remote.iter() {
        match local.tip(writer) {
            None => {
                delta.new_writers_for_local.push(writer.clone());
                delta.need_from_remote.push(NeededRange {
                    writer: writer.clone(),
                    from: None,
                    to: remote_tip.clone(),
                });
            }
            Some(local_tip) if local_tip != remote_tip => {
                delta.need_from_remote.push(NeededRange {
                    writer: writer.clone(),
                    from: Some(local_tip.clone()),
                    to: remote_tip.clone(),
                });
            }
            _ => {}
        }
    }

    for (writer, local_tip) in local.iter() {
        match remote.tip(writer) {
            None => {
                delta.new_writers_for_remote.push(writer.clone());
                delta.need_from_local.push(NeededRange {
                    writer: writer.clone(),
                    from: None,
                    to: local_tip.clone(),
                });
            }
            Some(remote_tip) if remote_tip != local_tip => {
                delta.need_from_local.push(NeededRange {
                    writer: writer.clone(),
                    from: Some(remote_tip.clone()),
                    to: local_tip.clone(),
                });
            }
            _ => {}
        }
    }

    delta
}
