//! The materialization engine: the stateful façade that ties the chain
//! loader, reducer, provenance index, and checkpointing together into
//! `open`/`materialize`/`materialize_slice`/commit.

use crate::chain::PatchChainLoader;
use crate::clock::Dot;
use crate::codec;
use crate::error::{validation, Result, WarpError};
use crate::frontier::Frontier;
use crate::ids::{CommitId, GraphName, WriterId};
use crate::patch::{Op, Patch, PatchEnvelope, PATCH_SCHEMA};
use crate::provenance_index::{causal_cone, ProvenanceIndex};
use crate::reducer;
use crate::state::GraphState;
use crate::store::{BlobPort, CommitNodeArgs, CommitPort, RefPort};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// `{every: N}` — create a checkpoint after every `N` patches folded since
/// the last one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CheckpointPolicy {
    pub every: u64,
}

/// What `remove_node` does when the node still has live edges attached.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum DeleteMode {
    #[default]
    Warn,
    Error,
    Cascade,
}

/// Concrete options struct controlling checkpoint, auto-materialize, and
/// delete-with-data behavior.
#[derive(Clone, Debug)]
pub struct MaterializationOptions {
    pub checkpoint_policy: Option<CheckpointPolicy>,
    pub auto_materialize: bool,
    pub on_delete_with_data: DeleteMode,
    pub max_message_bytes: Option<u64>,
}

impl Default for MaterializationOptions {
    fn default() -> Self {
        Self {
            checkpoint_policy: None,
            auto_materialize: true,
            on_delete_with_data: DeleteMode::Warn,
            max_message_bytes: None,
        }
    }
}

impl MaterializationOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(policy) = &self.checkpoint_policy {
            if policy.every == 0 {
                return Err(validation("checkpoint_policy.every must be a positive integer"));
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CheckpointSnapshot {
    state: GraphState,
    frontier: Frontier,
    provenance_index: ProvenanceIndex,
}

/// Result of [`MaterializationEngine::materialize_slice`].
pub struct SliceResult {
    pub state: GraphState,
    pub patch_count: usize,
}

fn writers_ref(graph: &GraphName) -> String {
    format!("refs/warp/{graph}/writers/", graph = graph.as_str())
}

fn writer_ref(graph: &GraphName, writer: &WriterId) -> String {
    format!("refs/warp/{graph}/writers/{writer}", graph = graph.as_str(), writer = writer.as_str())
}

fn checkpoint_head_ref(graph: &GraphName) -> String {
    format!("refs/warp/{graph}/checkpoints/head", graph = graph.as_str())
}

fn writer_id_from_ref(ref_name: &str, prefix: &str) -> Option<WriterId> {
    ref_name.strip_prefix(prefix).and_then(|id| WriterId::new(id).ok())
}

/// The stateful façade over a single `(graph, writer)` pair. Holds a cache
/// of the last-computed state, frontier, and provenance index; knows how
/// to refresh them from the object store and how to author new patches.
pub struct MaterializationEngine<'a> {
    graph: GraphName,
    writer_id: WriterId,
    commits: &'a dyn CommitPort,
    blobs: &'a dyn BlobPort,
    refs: &'a dyn RefPort,
    options: MaterializationOptions,
    state: Option<GraphState>,
    frontier: Option<Frontier>,
    provenance_index: Option<ProvenanceIndex>,
    dirty: bool,
    patches_since_checkpoint: u64,
}

impl<'a> MaterializationEngine<'a> {
    /// Validates `options` and constructs an engine bound to `graph` for
    /// patches authored by `writer_id`. No state is loaded yet — call
    /// [`materialize`](Self::materialize) first.
    pub fn open(
        commits: &'a dyn CommitPort,
        blobs: &'a dyn BlobPort,
        refs: &'a dyn RefPort,
        graph: GraphName,
        writer_id: WriterId,
        options: MaterializationOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            graph,
            writer_id,
            commits,
            blobs,
            refs,
            options,
            state: None,
            frontier: None,
            provenance_index: None,
            dirty: false,
            patches_since_checkpoint: 0,
        })
    }

    pub fn graph(&self) -> &GraphName {
        &self.graph
    }

    pub fn cached_state(&self) -> Option<&GraphState> {
        self.state.as_ref()
    }

    pub fn cached_frontier(&self) -> Option<&Frontier> {
        self.frontier.as_ref()
    }

    /// Folds every writer's chain (from the last checkpoint, if any, up to
    /// `ceiling` lamport if given) into a fresh state and caches the
    /// result.
    pub async fn materialize(&mut self, ceiling: Option<u64>) -> Result<GraphState> {
        let (mut state, mut frontier, mut provenance_index) = self.load_checkpoint().await?;

        let writer_refs = self.refs.list_refs(&writers_ref(&self.graph)).await?;
        let prefix = writers_ref(&self.graph);
        let loader = PatchChainLoader::new(self.commits, self.blobs);
        let mut folded = 0u64;

        for ref_name in writer_refs {
            let Some(writer) = writer_id_from_ref(&ref_name, &prefix) else {
                continue;
            };
            let Some(tip) = self.refs.read_ref(&ref_name).await? else {
                continue;
            };
            let tip = CommitId::new(tip)?;
            let boundary = frontier.tip(&writer).cloned();
            let patches = loader.load(&self.graph, &writer, &tip, boundary.as_ref()).await?;

            for (commit_id, patch) in patches {
                if let Some(ceiling) = ceiling {
                    if patch.lamport > ceiling {
                        break;
                    }
                }
                provenance_index.add_patch(
                    commit_id.clone(),
                    patch.reads.as_deref().unwrap_or(&[]),
                    patch.writes.as_deref().unwrap_or(&[]),
                );
                reducer::apply_patch(&mut state, &patch, &commit_id)?;
                frontier.set_tip(writer.clone(), commit_id);
                folded += 1;
            }
        }

        self.state = Some(state.clone());
        self.frontier = Some(frontier);
        self.provenance_index = Some(provenance_index);
        self.dirty = false;
        self.patches_since_checkpoint += folded;

        if let Some(policy) = self.options.checkpoint_policy {
            if self.patches_since_checkpoint >= policy.every {
                match self.create_checkpoint().await {
                    Ok(()) => self.patches_since_checkpoint = 0,
                    Err(err) => {
                        warn!(error = %err, "checkpoint creation failed, preserving patch counter");
                    }
                }
            }
        }

        Ok(state)
    }

    async fn load_checkpoint(&self) -> Result<(GraphState, Frontier, ProvenanceIndex)> {
        let Some(oid) = self.refs.read_ref(&checkpoint_head_ref(&self.graph)).await? else {
            return Ok((GraphState::new(), Frontier::new(), ProvenanceIndex::new()));
        };
        let bytes = self.blobs.read_blob(&oid).await?;
        let snapshot: CheckpointSnapshot = codec::decode(&bytes)?;
        Ok((snapshot.state, snapshot.frontier, snapshot.provenance_index))
    }

    async fn create_checkpoint(&self) -> Result<()> {
        let (Some(state), Some(frontier), Some(provenance_index)) =
            (self.state.clone(), self.frontier.clone(), self.provenance_index.clone())
        else {
            return Err(WarpError::NoState);
        };
        let snapshot = CheckpointSnapshot {
            state,
            frontier,
            provenance_index,
        };
        let bytes = codec::encode(&snapshot)?;
        let oid = self.blobs.write_blob(&bytes).await?;
        self.refs.update_ref(&checkpoint_head_ref(&self.graph), &oid).await?;
        debug!(graph = %self.graph, "checkpoint created");
        Ok(())
    }

    async fn ensure_state(&mut self) -> Result<GraphState> {
        if let Some(state) = &self.state {
            if !self.dirty {
                return Ok(state.clone());
            }
        }
        if !self.options.auto_materialize && self.state.is_none() {
            return Err(WarpError::NoState);
        }
        self.materialize(None).await
    }

    /// Computes the causal cone for `entity_key` and replays it against an
    /// empty state. Requires a cached state (or `auto_materialize`). An
    /// `entity_key` with no provenance returns an empty, zero-patch slice.
    pub async fn materialize_slice(&mut self, entity_key: &str) -> Result<SliceResult> {
        if self.state.is_none() {
            if self.options.auto_materialize {
                self.materialize(None).await?;
            } else {
                return Err(WarpError::NoState);
            }
        }
        let provenance_index = self.provenance_index.clone().unwrap_or_default();

        // Walks the same reads/writes closure as `causal_cone`, but fetches
        // patches asynchronously as each new key is discovered, so the
        // synchronous lookup handed to `causal_cone` below is already total
        // over every commit the final cone will need.
        let mut patches_by_commit: std::collections::BTreeMap<CommitId, Patch> = std::collections::BTreeMap::new();
        let mut seen_keys: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        let mut pending: Vec<String> = vec![entity_key.to_string()];
        while let Some(key) = pending.pop() {
            if !seen_keys.insert(key.clone()) {
                continue;
            }
            for commit_id in provenance_index.patches_for(&key) {
                if patches_by_commit.contains_key(commit_id) {
                    continue;
                }
                let Some(patch) = self.fetch_patch(commit_id).await? else {
                    continue;
                };
                pending.extend(patch.reads.iter().flatten().cloned());
                pending.extend(patch.writes.iter().flatten().cloned());
                patches_by_commit.insert(commit_id.clone(), patch);
            }
        }
        let lookup = |id: &CommitId| patches_by_commit.get(id);
        let cone = causal_cone(&provenance_index, entity_key, lookup);

        let mut state = GraphState::new();
        let mut patch_count = 0usize;
        for (commit_id, patch) in cone {
            reducer::apply_patch(&mut state, patch, &commit_id)?;
            patch_count += 1;
        }

        Ok(SliceResult { state, patch_count })
    }

    async fn fetch_patch(&self, commit_id: &CommitId) -> Result<Option<Patch>> {
        let message = match self.commits.show_node(commit_id.as_str()).await {
            Ok(message) => message,
            Err(_) => return Ok(None),
        };
        let Some(envelope) = PatchEnvelope::parse(&message) else {
            return Ok(None);
        };
        let bytes = self.blobs.read_blob(&envelope.patch_oid).await?;
        let patch = codec::decode(&bytes)?;
        Ok(Some(patch))
    }

    /// Authors and commits a patch from `ops`, updating this writer's ref.
    /// Eagerly folds the patch into any cached state rather than
    /// invalidating it; a failed commit never touches cached state.
    pub async fn commit_patch(
        &mut self,
        ops: Vec<Op>,
        reads: Vec<String>,
        writes: Vec<String>,
    ) -> Result<CommitId> {
        let context = match &self.state {
            Some(state) => state.observed_frontier.clone(),
            None if self.options.auto_materialize => self.materialize(None).await?.observed_frontier,
            None => return Err(WarpError::NoState),
        };

        let patch = Patch::new(self.writer_id.clone(), context, ops).with_provenance(reads, writes);
        let bytes = codec::encode(&patch)?;
        if let Some(limit) = self.options.max_message_bytes {
            if bytes.len() as u64 > limit {
                return Err(WarpError::PayloadTooLarge {
                    size: bytes.len() as u64,
                    limit,
                });
            }
        }

        let patch_oid = self.blobs.write_blob(&bytes).await?;
        let envelope = PatchEnvelope {
            graph: self.graph.as_str().to_string(),
            writer: self.writer_id.clone(),
            lamport: patch.lamport,
            patch_oid,
            schema: PATCH_SCHEMA,
        };

        let ref_name = writer_ref(&self.graph, &self.writer_id);
        let current_tip = self.refs.read_ref(&ref_name).await?;
        let sha = self
            .commits
            .commit_node(CommitNodeArgs {
                message: envelope.encode(),
                parents: current_tip.clone().into_iter().collect(),
                sign: false,
            })
            .await?;
        self.refs
            .compare_and_swap_ref(&ref_name, &sha, current_tip.as_deref())
            .await?;
        let commit_id = CommitId::new(sha)?;

        if let Some(state) = &self.state {
            let mut new_state = state.clone();
            reducer::apply_patch(&mut new_state, &patch, &commit_id)?;
            self.state = Some(new_state);
            if let Some(frontier) = &mut self.frontier {
                frontier.set_tip(self.writer_id.clone(), commit_id.clone());
            }
            if let Some(index) = &mut self.provenance_index {
                if let (Some(reads), Some(writes)) = (&patch.reads, &patch.writes) {
                    index.add_patch(commit_id.clone(), reads, writes);
                }
            }
            self.dirty = false;
            self.patches_since_checkpoint += 1;
        } else {
            self.dirty = true;
        }

        Ok(commit_id)
    }

    pub async fn add_node(&mut self, node: impl Into<String>) -> Result<CommitId> {
        let node = node.into();
        let state = self.ensure_state().await?;
        let counter = state.observed_frontier.get(&self.writer_id) + 1;
        let dot = Dot::new(self.writer_id.clone(), counter);
        self.commit_patch(
            vec![Op::NodeAdd { node: node.clone(), dot }],
            vec![],
            vec![node],
        )
        .await
    }

    /// Removes `node`. If it still has live edges, behavior is governed by
    /// `MaterializationOptions::on_delete_with_data`: `Warn` logs and
    /// proceeds, `Error` aborts, `Cascade` removes the edges in the same
    /// patch.
    pub async fn remove_node(&mut self, node: &str) -> Result<CommitId> {
        let state = self.ensure_state().await?;
        let touching: Vec<(String, String, String)> = state
            .edges()
            .filter(|(from, to, _)| from == node || to == node)
            .collect();

        if !touching.is_empty() {
            match self.options.on_delete_with_data {
                DeleteMode::Error => {
                    return Err(validation(format!(
                        "node {node:?} has {} live edge(s); on_delete_with_data is Error",
                        touching.len()
                    )));
                }
                DeleteMode::Warn => {
                    warn!(node, edges = touching.len(), "removing node with live edges");
                }
                DeleteMode::Cascade => {}
            }
        }

        let mut ops = Vec::new();
        let mut writes = vec![node.to_string()];
        if matches!(self.options.on_delete_with_data, DeleteMode::Cascade) {
            for (from, to, label) in &touching {
                let key = crate::state::encode_edge_key(from, to, label);
                let observed_dots = state.edge_alive.alive_dots(&key);
                ops.push(Op::EdgeTombstone {
                    from: from.clone(),
                    to: to.clone(),
                    label: label.clone(),
                    observed_dots,
                });
                writes.push(key);
            }
        }
        let observed_dots = state.node_alive.alive_dots(&node.to_string());
        ops.push(Op::NodeTombstone {
            node: node.to_string(),
            observed_dots,
        });

        self.commit_patch(ops, vec![node.to_string()], writes).await
    }
}
