//! An in-memory implementation of every port in [`crate::store`].
//!
//! Grounded on `echo-cas::MemoryTier`'s shape — content-addressed via
//! BLAKE3, single process, no persistence — generalized from "blobs only"
//! to all five ports so the crate's tests (and anyone prototyping against
//! this engine) have a working backend without standing up a real object
//! store.
//!
//! Oids here are the first 20 bytes of `BLAKE3(content)`, hex-encoded to 40
//! chars, matching the SHA-1-shaped oid contract the ports validate against
//! without actually depending on SHA-1.

use crate::error::{validation, WarpError};
use crate::store::{
    is_valid_config_key, is_valid_oid, is_valid_ref, BlobPort, CommitInfo, CommitNodeArgs,
    CommitNodeWithTreeArgs, CommitPort, ConfigPort, LogOptions, Ping, RefPort, TreePort,
    EMPTY_TREE,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Mutex;

fn content_oid(bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes);
    hex::encode(&hash.as_bytes()[..20])
}

#[derive(Clone, Debug)]
struct StoredCommit {
    message: String,
    parents: Vec<String>,
    tree_oid: String,
    author: String,
    date: String,
}

/// In-memory object store backing all five ports, plus the ref and config
/// namespaces this crate persists its own state under.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    commits: Mutex<BTreeMap<String, StoredCommit>>,
    trees: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    refs: Mutex<BTreeMap<String, String>>,
    config: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn store_commit(&self, commit: StoredCommit) -> String {
        let payload = format!("{}\0{}\0{}", commit.message, commit.parents.join(","), commit.tree_oid);
        let sha = content_oid(payload.as_bytes());
        self.commits.lock().unwrap().insert(sha.clone(), commit);
        sha
    }
}

#[async_trait]
impl BlobPort for MemoryStore {
    async fn write_blob(&self, bytes: &[u8]) -> crate::error::Result<String> {
        let oid = content_oid(bytes);
        self.blobs.lock().unwrap().entry(oid.clone()).or_insert_with(|| bytes.to_vec());
        Ok(oid)
    }

    async fn read_blob(&self, oid: &str) -> crate::error::Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(oid)
            .cloned()
            .ok_or_else(|| WarpError::NotFound {
                what: "blob".to_string(),
                id: oid.to_string(),
            })
    }
}

#[async_trait]
impl TreePort for MemoryStore {
    async fn write_tree(&self, entries: Vec<String>) -> crate::error::Result<String> {
        let mut paths = BTreeMap::new();
        for line in &entries {
            let (meta, path) = line
                .split_once('\t')
                .ok_or_else(|| validation(format!("malformed tree entry {line:?}")))?;
            let oid = meta
                .split_whitespace()
                .nth(2)
                .ok_or_else(|| validation(format!("malformed tree entry {line:?}")))?;
            paths.insert(path.to_string(), oid.to_string());
        }
        if paths.is_empty() {
            return Ok(EMPTY_TREE.to_string());
        }
        let canonical = paths
            .iter()
            .map(|(path, oid)| format!("{oid}\t{path}"))
            .collect::<Vec<_>>()
            .join("\n");
        let tree_oid = content_oid(canonical.as_bytes());
        self.trees.lock().unwrap().insert(tree_oid.clone(), paths);
        Ok(tree_oid)
    }

    async fn read_tree(&self, tree_oid: &str) -> crate::error::Result<BTreeMap<String, Vec<u8>>> {
        if tree_oid == EMPTY_TREE {
            return Ok(BTreeMap::new());
        }
        let oids = self.read_tree_oids(tree_oid).await?;
        let blobs = self.blobs.lock().unwrap();
        let mut out = BTreeMap::new();
        for (path, oid) in oids {
            let bytes = blobs.get(&oid).cloned().ok_or_else(|| WarpError::NotFound {
                what: "blob".to_string(),
                id: oid.clone(),
            })?;
            out.insert(path, bytes);
        }
        Ok(out)
    }

    async fn read_tree_oids(&self, tree_oid: &str) -> crate::error::Result<BTreeMap<String, String>> {
        if tree_oid == EMPTY_TREE {
            return Ok(BTreeMap::new());
        }
        self.trees
            .lock()
            .unwrap()
            .get(tree_oid)
            .cloned()
            .ok_or_else(|| WarpError::NotFound {
                what: "tree".to_string(),
                id: tree_oid.to_string(),
            })
    }
}

#[async_trait]
impl CommitPort for MemoryStore {
    async fn commit_node(&self, args: CommitNodeArgs) -> crate::error::Result<String> {
        let tree_oid = self
            .commits
            .lock()
            .unwrap()
            .get(args.parents.first().map(String::as_str).unwrap_or(""))
            .map(|c| c.tree_oid.clone())
            .unwrap_or_else(|| EMPTY_TREE.to_string());
        Ok(self.store_commit(StoredCommit {
            message: args.message,
            parents: args.parents,
            tree_oid,
            author: "warpgraph".to_string(),
            date: "1970-01-01T00:00:00Z".to_string(),
        }))
    }

    async fn commit_node_with_tree(&self, args: CommitNodeWithTreeArgs) -> crate::error::Result<String> {
        Ok(self.store_commit(StoredCommit {
            message: args.message,
            parents: args.parents,
            tree_oid: args.tree_oid,
            author: "warpgraph".to_string(),
            date: "1970-01-01T00:00:00Z".to_string(),
        }))
    }

    async fn show_node(&self, sha: &str) -> crate::error::Result<String> {
        self.commits
            .lock()
            .unwrap()
            .get(sha)
            .map(|c| c.message.clone())
            .ok_or_else(|| WarpError::NotFound {
                what: "commit".to_string(),
                id: sha.to_string(),
            })
    }

    async fn get_node_info(&self, sha: &str) -> crate::error::Result<CommitInfo> {
        let commits = self.commits.lock().unwrap();
        let commit = commits.get(sha).ok_or_else(|| WarpError::NotFound {
            what: "commit".to_string(),
            id: sha.to_string(),
        })?;
        Ok(CommitInfo {
            sha: sha.to_string(),
            message: commit.message.clone(),
            author: commit.author.clone(),
            date: commit.date.clone(),
            parents: commit.parents.clone(),
        })
    }

    async fn log_nodes(&self, opts: LogOptions) -> crate::error::Result<String> {
        let mut sha = self.read_ref(&opts.ref_name).await?;
        let commits = self.commits.lock().unwrap();
        let mut lines = Vec::new();
        while let Some(cur) = sha {
            let Some(commit) = commits.get(&cur) else { break };
            lines.push(format!("{cur}\0{}", commit.message));
            if let Some(limit) = opts.limit {
                if lines.len() as u32 >= limit {
                    break;
                }
            }
            sha = commit.parents.first().cloned();
        }
        Ok(lines.join(""))
    }

    async fn log_nodes_stream(&self, opts: LogOptions) -> crate::error::Result<BoxStream<'static, crate::error::Result<Vec<u8>>>> {
        let text = self.log_nodes(opts).await?;
        Ok(stream::iter(vec![Ok(text.into_bytes())]).boxed())
    }

    async fn count_nodes(&self, ref_name: &str) -> crate::error::Result<u64> {
        let mut sha = self.read_ref(ref_name).await?;
        let commits = self.commits.lock().unwrap();
        let mut count = 0u64;
        while let Some(cur) = sha {
            let Some(commit) = commits.get(&cur) else { break };
            count += 1;
            sha = commit.parents.first().cloned();
        }
        Ok(count)
    }

    async fn node_exists(&self, sha: &str) -> crate::error::Result<bool> {
        Ok(self.commits.lock().unwrap().contains_key(sha))
    }

    async fn get_commit_tree(&self, sha: &str) -> crate::error::Result<String> {
        self.commits
            .lock()
            .unwrap()
            .get(sha)
            .map(|c| c.tree_oid.clone())
            .ok_or_else(|| WarpError::NotFound {
                what: "commit".to_string(),
                id: sha.to_string(),
            })
    }

    async fn ping(&self) -> crate::error::Result<Ping> {
        Ok(Ping {
            ok: true,
            latency_ms: 0,
        })
    }
}

#[async_trait]
impl RefPort for MemoryStore {
    async fn update_ref(&self, ref_name: &str, oid: &str) -> crate::error::Result<()> {
        if !is_valid_ref(ref_name) {
            return Err(validation(format!("invalid ref {ref_name:?}")));
        }
        if !is_valid_oid(oid) {
            return Err(validation(format!("invalid oid {oid:?}")));
        }
        self.refs.lock().unwrap().insert(ref_name.to_string(), oid.to_string());
        Ok(())
    }

    async fn read_ref(&self, ref_name: &str) -> crate::error::Result<Option<String>> {
        Ok(self.refs.lock().unwrap().get(ref_name).cloned())
    }

    async fn delete_ref(&self, ref_name: &str) -> crate::error::Result<()> {
        self.refs.lock().unwrap().remove(ref_name);
        Ok(())
    }

    async fn list_refs(&self, prefix: &str) -> crate::error::Result<Vec<String>> {
        Ok(self
            .refs
            .lock()
            .unwrap()
            .keys()
            .filter(|r| r.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn compare_and_swap_ref(
        &self,
        ref_name: &str,
        new_oid: &str,
        expected_oid: Option<&str>,
    ) -> crate::error::Result<()> {
        if !is_valid_ref(ref_name) {
            return Err(validation(format!("invalid ref {ref_name:?}")));
        }
        let mut refs = self.refs.lock().unwrap();
        let current = refs.get(ref_name).map(String::as_str);
        if current != expected_oid {
            return Err(WarpError::RefConflict {
                ref_name: ref_name.to_string(),
                expected: expected_oid.map(str::to_string),
                found: current.map(str::to_string),
            });
        }
        refs.insert(ref_name.to_string(), new_oid.to_string());
        Ok(())
    }
}

#[async_trait]
impl ConfigPort for MemoryStore {
    async fn config_get(&self, key: &str) -> crate::error::Result<Option<String>> {
        Ok(self.config.lock().unwrap().get(key).cloned())
    }

    async fn config_set(&self, key: &str, value: &str) -> crate::error::Result<()> {
        if !is_valid_config_key(key) {
            return Err(validation(format!("invalid config key {key:?}")));
        }
        self.config.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn blob_write_is_content_addressed() {
        let store = MemoryStore::new();
        let a = store.write_blob(b"hello").await.unwrap();
        let b = store.write_blob(b"hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.read_blob(&a).await.unwrap(), b"hello");
    }

    #[async_std::test]
    async fn ref_cas_rejects_mismatch() {
        let store = MemoryStore::new();
        let oid = "a".repeat(40);
        store.update_ref("refs/warp/g1/writers/alice", &oid).await.unwrap();
        let wrong = "b".repeat(40);
        let err = store
            .compare_and_swap_ref("refs/warp/g1/writers/alice", &wrong, Some(&"c".repeat(40)))
            .await
            .unwrap_err();
        assert!(matches!(err, WarpError::RefConflict { .. }));
    }

    #[async_std::test]
    async fn tree_round_trips_through_blobs() {
        let store = MemoryStore::new();
        let oid = store.write_blob(b"payload").await.unwrap();
        let entries = vec![format!("100644 blob {oid}\tnode/a")];
        let tree_oid = store.write_tree(entries).await.unwrap();
        let tree = store.read_tree(&tree_oid).await.unwrap();
        assert_eq!(tree.get("node/a").unwrap(), b"payload");
    }

    #[async_std::test]
    async fn commit_chain_walks_parents() {
        let store = MemoryStore::new();
        let c1 = store
            .commit_node(CommitNodeArgs {
                message: "first".into(),
                parents: vec![],
                sign: false,
            })
            .await
            .unwrap();
        let c2 = store
            .commit_node(CommitNodeArgs {
                message: "second".into(),
                parents: vec![c1.clone()],
                sign: false,
            })
            .await
            .unwrap();
        store.update_ref("refs/warp/g1/writers/alice", &c2).await.unwrap();
        let count = store.count_nodes("refs/warp/g1/writers/alice").await.unwrap();
        assert_eq!(count, 2);
    }
}
