//! Sync request/response messages and the serving/applying halves of the
//! protocol.

use crate::chain::PatchChainLoader;
use crate::error::Result;
use crate::frontier::{compute_sync_delta, Frontier};
use crate::ids::{CommitId, GraphName, WriterId};
use crate::patch::Patch;
use crate::reducer;
use crate::state::GraphState;
use crate::store::{BlobPort, CommitPort};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub frontier: Frontier,
}

impl SyncRequest {
    pub fn new(frontier: Frontier) -> Self {
        Self {
            kind: "sync-request".to_string(),
            frontier,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncPatch {
    pub writer_id: WriterId,
    pub sha: CommitId,
    pub patch: Patch,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub frontier: Frontier,
    pub patches: Vec<SyncPatch>,
}

impl SyncResponse {
    pub fn new(frontier: Frontier, patches: Vec<SyncPatch>) -> Self {
        Self {
            kind: "sync-response".to_string(),
            frontier,
            patches,
        }
    }
}

/// Serves a [`SyncRequest`] against this replica's own frontier and patch
/// chains. Divergence on a single writer's range is skipped rather than
/// failing the whole response — other writers are still served.
pub async fn process_sync_request(
    commits: &dyn CommitPort,
    blobs: &dyn BlobPort,
    graph: &GraphName,
    local_frontier: &Frontier,
    request: &SyncRequest,
) -> Result<SyncResponse> {
    let delta = compute_sync_delta(&request.frontier, local_frontier);
    let loader = PatchChainLoader::new(commits, blobs);
    let mut patches = Vec::new();

    for range in delta.need_from_remote {
        let Some(tip) = local_frontier.tip(&range.writer) else {
            continue;
        };
        match loader.load(graph, &range.writer, tip, range.from.as_ref()).await {
            Ok(loaded) => {
                for (sha, patch) in loaded {
                    patches.push(SyncPatch {
                        writer_id: range.writer.clone(),
                        sha,
                        patch,
                    });
                }
            }
            Err(err) if err.kind() == crate::error::ErrorKind::Causal => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(SyncResponse::new(local_frontier.clone(), patches))
}

/// Result of [`apply_sync_response`].
pub struct AppliedSync {
    pub state: GraphState,
    pub frontier: Frontier,
    pub applied_count: usize,
}

/// Applies a [`SyncResponse`] on top of `state`/`frontier`, grouping
/// patches by writer and applying each writer's patches in the order the
/// server sent them (chronological).
pub fn apply_sync_response(
    state: &GraphState,
    frontier: &Frontier,
    response: &SyncResponse,
) -> Result<AppliedSync> {
    let mut new_state = state.clone();
    let mut new_frontier = frontier.clone();

    let mut by_writer: BTreeMap<WriterId, Vec<&SyncPatch>> = BTreeMap::new();
    for patch in &response.patches {
        by_writer.entry(patch.writer_id.clone()).or_default().push(patch);
    }

    let mut applied_count = 0usize;
    for (writer, patches) in by_writer {
        let mut last_sha = None;
        for sync_patch in patches {
            reducer::apply_patch(&mut new_state, &sync_patch.patch, &sync_patch.sha)?;
            last_sha = Some(sync_patch.sha.clone());
            applied_count += 1;
        }
        if let Some(sha) = last_sha {
            new_frontier.set_tip(writer, sha);
        }
    }

    Ok(AppliedSync {
        state: new_state,
        frontier: new_frontier,
        applied_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VersionVector;
    use crate::memory_store::MemoryStore;
    use crate::patch::{Op, PatchEnvelope, PATCH_SCHEMA};
    use crate::store::{CommitNodeArgs, RefPort};

    async fn commit_patch(store: &MemoryStore, graph: &str, writer: &WriterId, lamport: u64, parent: Option<String>) -> CommitId {
        let patch = Patch {
            schema: PATCH_SCHEMA,
            writer: writer.clone(),
            lamport,
            context: VersionVector::new(),
            ops: vec![Op::NodeAdd {
                node: format!("n{lamport}"),
                dot: crate::clock::Dot::new(writer.clone(), lamport),
            }],
            reads: None,
            writes: None,
        };
        let bytes = crate::codec::encode(&patch).unwrap();
        let patch_oid = store.write_blob(&bytes).await.unwrap();
        let envelope = PatchEnvelope {
            graph: graph.to_string(),
            writer: writer.clone(),
            lamport,
            patch_oid,
            schema: PATCH_SCHEMA,
        };
        let sha = store
            .commit_node(CommitNodeArgs {
                message: envelope.encode(),
                parents: parent.into_iter().collect(),
                sign: false,
            })
            .await
            .unwrap();
        CommitId::new(sha).unwrap()
    }

    #[async_std::test]
    async fn full_round_trip_from_empty_requester() {
        let store = MemoryStore::new();
        let writer = WriterId::new("alice").unwrap();
        let c1 = commit_patch(&store, "g1", &writer, 1, None).await;
        let c2 = commit_patch(&store, "g1", &writer, 2, Some(c1.as_str().to_string())).await;

        let mut server_frontier = Frontier::new();
        server_frontier.set_tip(writer.clone(), c2.clone());

        let request = SyncRequest::new(Frontier::new());
        let graph = GraphName::new("g1").unwrap();
        let response = process_sync_request(&store, &store, &graph, &server_frontier, &request)
            .await
            .unwrap();
        assert_eq!(response.patches.len(), 2);

        let applied = apply_sync_response(&GraphState::new(), &Frontier::new(), &response).unwrap();
        assert_eq!(applied.applied_count, 2);
        assert_eq!(applied.frontier.tip(&writer), Some(&c2));
        let nodes: std::collections::BTreeSet<_> = applied.state.nodes().cloned().collect();
        assert!(nodes.contains("n1"));
        assert!(nodes.contains("n2"));
    }

    #[async_std::test]
    async fn diverging_writer_is_skipped_not_fatal() {
        let store = MemoryStore::new();
        let writer = WriterId::new("alice").unwrap();
        let c1 = commit_patch(&store, "g1", &writer, 1, None).await;

        let mut server_frontier = Frontier::new();
        server_frontier.set_tip(writer.clone(), c1.clone());

        let mut requester_frontier = Frontier::new();
        let unrelated = CommitId::new("f".repeat(40)).unwrap();
        requester_frontier.set_tip(writer.clone(), unrelated);

        let request = SyncRequest::new(requester_frontier);
        let graph = GraphName::new("g1").unwrap();
        let response = process_sync_request(&store, &store, &graph, &server_frontier, &request)
            .await
            .unwrap();
        assert!(response.patches.is_empty());
    }
}
