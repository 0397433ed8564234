//! Forking: creates a new graph namespace whose writer ref points at a
//! validated ancestor commit of an existing writer chain.

use crate::error::{Result, WarpError};
use crate::ids::{CommitId, GraphName, WriterId};
use crate::store::{CommitPort, RefPort};

fn writer_ref(graph: &str, writer: &str) -> String {
    format!("refs/warp/{graph}/writers/{writer}")
}

/// The outcome of a successful [`fork`].
pub struct ForkResult {
    pub new_graph: GraphName,
    pub new_writer: WriterId,
    pub at_commit: CommitId,
}

/// Forks `source_writer`'s chain in `source_graph` at `at_commit` into a
/// fresh `(new_graph, new_writer)` namespace: the new writer's chain tip is
/// set to `at_commit`, so materializing `new_graph` from that point sees
/// exactly the history up to and including `at_commit`, isolated from
/// anything the source graph commits afterward.
pub async fn fork(
    commits: &dyn CommitPort,
    refs: &dyn RefPort,
    source_graph: &str,
    source_writer: &str,
    at_commit: &str,
    new_graph: &str,
    new_writer: &str,
) -> Result<ForkResult> {
    let new_graph_id = GraphName::new(new_graph).map_err(|_| WarpError::ForkNameInvalid {
        name: new_graph.to_string(),
    })?;
    let new_writer_id = WriterId::new(new_writer).map_err(|_| WarpError::ForkWriterIdInvalid {
        writer: new_writer.to_string(),
    })?;
    let source_graph_id = GraphName::new(source_graph).map_err(|err| WarpError::ForkInvalidArgs {
        reason: err.to_string(),
    })?;
    let source_writer_id = WriterId::new(source_writer).map_err(|err| WarpError::ForkInvalidArgs {
        reason: err.to_string(),
    })?;
    let at_commit_id = CommitId::new(at_commit).map_err(|err| WarpError::ForkInvalidArgs {
        reason: err.to_string(),
    })?;

    let new_ref = writer_ref(new_graph_id.as_str(), new_writer_id.as_str());
    if refs.read_ref(&new_ref).await?.is_some() {
        return Err(WarpError::ForkAlreadyExists {
            name: new_graph_id.as_str().to_string(),
        });
    }

    let source_ref = writer_ref(source_graph_id.as_str(), source_writer_id.as_str());
    let Some(tip) = refs.read_ref(&source_ref).await? else {
        return Err(WarpError::ForkWriterNotFound {
            graph: source_graph_id.as_str().to_string(),
            writer: source_writer_id.as_str().to_string(),
        });
    };

    if !commits.node_exists(at_commit_id.as_str()).await? {
        return Err(WarpError::ForkPatchNotFound {
            sha: at_commit_id.as_str().to_string(),
        });
    }

    let mut cursor = Some(tip);
    let mut found = false;
    while let Some(current) = cursor {
        if current == at_commit_id.as_str() {
            found = true;
            break;
        }
        let info = commits.get_node_info(&current).await?;
        cursor = info.parents.into_iter().next();
    }
    if !found {
        return Err(WarpError::ForkPatchNotInChain {
            sha: at_commit_id.as_str().to_string(),
            writer: source_writer_id.as_str().to_string(),
        });
    }

    refs.compare_and_swap_ref(&new_ref, at_commit_id.as_str(), None).await?;

    Ok(ForkResult {
        new_graph: new_graph_id,
        new_writer: new_writer_id,
        at_commit: at_commit_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Dot, VersionVector};
    use crate::memory_store::MemoryStore;
    use crate::patch::{Op, Patch, PatchEnvelope, PATCH_SCHEMA};
    use crate::store::{BlobPort, CommitNodeArgs};

    async fn commit_patch(
        store: &MemoryStore,
        graph: &str,
        writer: &str,
        lamport: u64,
        parent: Option<String>,
        node: &str,
    ) -> String {
        let writer_id = WriterId::new(writer).unwrap();
        let patch = Patch {
            schema: PATCH_SCHEMA,
            writer: writer_id.clone(),
            lamport,
            context: VersionVector::new(),
            ops: vec![Op::NodeAdd {
                node: node.to_string(),
                dot: Dot::new(writer_id.clone(), lamport),
            }],
            reads: None,
            writes: None,
        };
        let bytes = crate::codec::encode(&patch).unwrap();
        let patch_oid = store.write_blob(&bytes).await.unwrap();
        let envelope = PatchEnvelope {
            graph: graph.to_string(),
            writer: writer_id,
            lamport,
            patch_oid,
            schema: PATCH_SCHEMA,
        };
        store
            .commit_node(CommitNodeArgs {
                message: envelope.encode(),
                parents: parent.into_iter().collect(),
                sign: false,
            })
            .await
            .unwrap()
    }

    #[async_std::test]
    async fn forks_at_validated_ancestor() {
        let store = MemoryStore::new();
        let c1 = commit_patch(&store, "g1", "alice", 1, None, "shared").await;
        let c2 = commit_patch(&store, "g1", "alice", 2, Some(c1.clone()), "later").await;
        store.update_ref("refs/warp/g1/writers/alice", &c2).await.unwrap();

        let result = fork(&store, &store, "g1", "alice", &c1, "fork1", "fw").await.unwrap();
        assert_eq!(result.new_graph.as_str(), "fork1");
        let tip = store.read_ref("refs/warp/fork1/writers/fw").await.unwrap();
        assert_eq!(tip, Some(c1));
    }

    #[async_std::test]
    async fn rejects_invalid_new_graph_name() {
        let store = MemoryStore::new();
        let c1 = commit_patch(&store, "g1", "alice", 1, None, "shared").await;
        store.update_ref("refs/warp/g1/writers/alice", &c1).await.unwrap();

        let err = fork(&store, &store, "g1", "alice", &c1, "bad/name", "fw").await.unwrap_err();
        assert!(matches!(err, WarpError::ForkNameInvalid { .. }));
    }

    #[async_std::test]
    async fn rejects_missing_source_writer() {
        let store = MemoryStore::new();
        let c1 = commit_patch(&store, "g1", "alice", 1, None, "shared").await;

        let err = fork(&store, &store, "g1", "nobody", &c1, "fork1", "fw").await.unwrap_err();
        assert!(matches!(err, WarpError::ForkWriterNotFound { .. }));
    }

    #[async_std::test]
    async fn rejects_commit_not_in_source_chain() {
        let store = MemoryStore::new();
        let c1 = commit_patch(&store, "g1", "alice", 1, None, "shared").await;
        store.update_ref("refs/warp/g1/writers/alice", &c1).await.unwrap();
        let unrelated = commit_patch(&store, "g2", "bob", 1, None, "other").await;

        let err = fork(&store, &store, "g1", "alice", &unrelated, "fork1", "fw")
            .await
            .unwrap_err();
        assert!(matches!(err, WarpError::ForkPatchNotInChain { .. }));
    }

    #[async_std::test]
    async fn rejects_fork_onto_existing_namespace() {
        let store = MemoryStore::new();
        let c1 = commit_patch(&store, "g1", "alice", 1, None, "shared").await;
        store.update_ref("refs/warp/g1/writers/alice", &c1).await.unwrap();
        fork(&store, &store, "g1", "alice", &c1, "fork1", "fw").await.unwrap();

        let err = fork(&store, &store, "g1", "alice", &c1, "fork1", "fw").await.unwrap_err();
        assert!(matches!(err, WarpError::ForkAlreadyExists { .. }));
    }
}
