//! LRU-bounded checkpoint cache.
//!
//! The index itself is a JSON blob addressed by a ref
//! (`refs/warp/<graph>/seek-cache`); each index entry points at a snapshot
//! manifest stored through [`SnapshotBackend`], an external collaborator
//! treated as opaque here (it owns its own chunked-tree representation).

use crate::error::{Result, WarpError};
use crate::store::{BlobPort, RefPort};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_MAX_ENTRIES: usize = 200;
const RETRY_ATTEMPTS: u32 = 3;

/// The snapshot payload backend: stores/restores opaque byte blobs behind a
/// content-addressed, chunked tree representation. Treated as an external
/// collaborator — this crate only calls it through these four operations.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    async fn store(&self, bytes: &[u8]) -> Result<String>;
    async fn create_tree(&self, manifest: &str) -> Result<String>;
    async fn read_manifest(&self, tree_id: &str) -> Result<String>;
    async fn restore(&self, manifest: &str) -> Result<Vec<u8>>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexEntry {
    pub tree_oid: String,
    pub created_at: u64,
    pub ceiling: u64,
    pub frontier_hash: String,
    pub size_bytes: u64,
    pub codec: String,
    pub schema_version: u32,
    pub last_accessed_at: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct CheckpointIndex {
    entries: BTreeMap<String, IndexEntry>,
}

/// Builds the `"v1:t<ceiling>-<frontierHash>"` cache key.
pub fn cache_key(ceiling: u64, frontier_hash: &str) -> String {
    format!("v1:t{ceiling}-{frontier_hash}")
}

pub struct CheckpointCache<'a> {
    ref_name: String,
    refs: &'a dyn RefPort,
    blobs: &'a dyn BlobPort,
    snapshots: &'a dyn SnapshotBackend,
    max_entries: usize,
}

impl<'a> CheckpointCache<'a> {
    pub fn new(
        ref_name: impl Into<String>,
        refs: &'a dyn RefPort,
        blobs: &'a dyn BlobPort,
        snapshots: &'a dyn SnapshotBackend,
    ) -> Self {
        Self {
            ref_name: ref_name.into(),
            refs,
            blobs,
            snapshots,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    async fn load_index(&self) -> Result<CheckpointIndex> {
        let Some(oid) = self.refs.read_ref(&self.ref_name).await? else {
            return Ok(CheckpointIndex::default());
        };
        let bytes = self.blobs.read_blob(&oid).await?;
        serde_json::from_slice(&bytes).map_err(|err| WarpError::Codec {
            reason: err.to_string(),
        })
    }

    async fn save_index(&self, index: &CheckpointIndex) -> Result<()> {
        let bytes = serde_json::to_vec(index).map_err(|err| WarpError::Codec {
            reason: err.to_string(),
        })?;
        let oid = self.blobs.write_blob(&bytes).await?;
        self.refs.update_ref(&self.ref_name, &oid).await
    }

    /// Re-reads the index, applies `mutate`, and writes it back, retrying
    /// up to [`RETRY_ATTEMPTS`] times on transient write failures with a
    /// fresh read between attempts.
    async fn mutate_index(&self, mutate: impl Fn(&mut CheckpointIndex)) -> Result<CheckpointIndex> {
        let mut last_err = None;
        for _ in 0..RETRY_ATTEMPTS {
            let mut index = self.load_index().await?;
            mutate(&mut index);
            match self.save_index(&index).await {
                Ok(()) => return Ok(index),
                Err(err) if err.kind() == crate::error::ErrorKind::Transient => {
                    last_err = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| WarpError::Transient {
            reason: "checkpoint index update".to_string(),
            attempts: RETRY_ATTEMPTS,
        }))
    }

    /// Looks up `key`. If the index entry exists but its manifest/blob can
    /// no longer be restored (externally garbage-collected), the entry is
    /// dropped from the index and `None` is returned — self-healing rather
    /// than a hard error.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let index = self.load_index().await?;
        let Some(entry) = index.entries.get(key).cloned() else {
            return Ok(None);
        };

        let restored = async {
            let manifest = self.snapshots.read_manifest(&entry.tree_oid).await?;
            self.snapshots.restore(&manifest).await
        }
        .await;

        match restored {
            Ok(bytes) => {
                let now = entry.created_at.max(entry.last_accessed_at.unwrap_or(0)) + 1;
                self.mutate_index(|idx| {
                    if let Some(e) = idx.entries.get_mut(key) {
                        e.last_accessed_at = Some(now);
                    }
                })
                .await?;
                Ok(Some(bytes))
            }
            Err(_) => {
                self.mutate_index(|idx| {
                    idx.entries.remove(key);
                })
                .await?;
                Ok(None)
            }
        }
    }

    /// Stores `bytes` under `key` with the given checkpoint metadata,
    /// evicting the least-recently-used entry (by `last_accessed_at`, else
    /// `created_at`) once the index exceeds `max_entries`.
    #[allow(clippy::too_many_arguments)]
    pub async fn set(
        &self,
        key: &str,
        bytes: &[u8],
        ceiling: u64,
        frontier_hash: &str,
        codec: &str,
        schema_version: u32,
        created_at: u64,
    ) -> Result<()> {
        let manifest = self.snapshots.store(bytes).await?;
        let tree_oid = self.snapshots.create_tree(&manifest).await?;
        let entry = IndexEntry {
            tree_oid,
            created_at,
            ceiling,
            frontier_hash: frontier_hash.to_string(),
            size_bytes: bytes.len() as u64,
            codec: codec.to_string(),
            schema_version,
            last_accessed_at: None,
        };

        let max_entries = self.max_entries;
        let key_owned = key.to_string();
        self.mutate_index(move |idx| {
            idx.entries.insert(key_owned.clone(), entry.clone());
            evict_lru(idx, max_entries);
        })
        .await?;
        Ok(())
    }

    pub async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.load_index().await?.entries.contains_key(key))
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.load_index().await?.entries.keys().cloned().collect())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let key_owned = key.to_string();
        self.mutate_index(move |idx| {
            idx.entries.remove(&key_owned);
        })
        .await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.save_index(&CheckpointIndex::default()).await
    }
}

fn evict_lru(index: &mut CheckpointIndex, max_entries: usize) {
    while index.entries.len() > max_entries {
        let oldest_key = index
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed_at.unwrap_or(entry.created_at))
            .map(|(key, _)| key.clone());
        let Some(oldest_key) = oldest_key else { break };
        index.entries.remove(&oldest_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use std::sync::Mutex;

    struct FakeSnapshots {
        manifests: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl FakeSnapshots {
        fn new() -> Self {
            Self {
                manifests: Mutex::new(BTreeMap::new()),
            }
        }
    }

    #[async_trait]
    impl SnapshotBackend for FakeSnapshots {
        async fn store(&self, bytes: &[u8]) -> Result<String> {
            let id = format!("manifest-{}", self.manifests.lock().unwrap().len());
            self.manifests.lock().unwrap().insert(id.clone(), bytes.to_vec());
            Ok(id)
        }

        async fn create_tree(&self, manifest: &str) -> Result<String> {
            Ok(format!("tree-{manifest}"))
        }

        async fn read_manifest(&self, tree_id: &str) -> Result<String> {
            tree_id
                .strip_prefix("tree-")
                .map(str::to_string)
                .ok_or_else(|| WarpError::NotFound {
                    what: "tree".to_string(),
                    id: tree_id.to_string(),
                })
        }

        async fn restore(&self, manifest: &str) -> Result<Vec<u8>> {
            self.manifests
                .lock()
                .unwrap()
                .get(manifest)
                .cloned()
                .ok_or_else(|| WarpError::NotFound {
                    what: "manifest".to_string(),
                    id: manifest.to_string(),
                })
        }
    }

    #[async_std::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        let snapshots = FakeSnapshots::new();
        let cache = CheckpointCache::new("refs/warp/g1/seek-cache", &store, &store, &snapshots);
        cache.set("v1:t5-abc", b"snapshot-bytes", 5, "abc", "cbor", 1, 100).await.unwrap();
        let got = cache.get("v1:t5-abc").await.unwrap();
        assert_eq!(got, Some(b"snapshot-bytes".to_vec()));
    }

    #[async_std::test]
    async fn missing_key_returns_none() {
        let store = MemoryStore::new();
        let snapshots = FakeSnapshots::new();
        let cache = CheckpointCache::new("refs/warp/g1/seek-cache", &store, &store, &snapshots);
        assert_eq!(cache.get("nope").await.unwrap(), None);
    }

    #[async_std::test]
    async fn self_heals_when_manifest_is_gone() {
        let store = MemoryStore::new();
        let snapshots = FakeSnapshots::new();
        let cache = CheckpointCache::new("refs/warp/g1/seek-cache", &store, &store, &snapshots);
        cache.set("v1:t5-abc", b"bytes", 5, "abc", "cbor", 1, 100).await.unwrap();
        snapshots.manifests.lock().unwrap().clear();

        assert_eq!(cache.get("v1:t5-abc").await.unwrap(), None);
        assert!(!cache.has("v1:t5-abc").await.unwrap());
    }

    #[async_std::test]
    async fn lru_eviction_respects_max_entries() {
        let store = MemoryStore::new();
        let snapshots = FakeSnapshots::new();
        let cache = CheckpointCache::new("refs/warp/g1/seek-cache", &store, &store, &snapshots)
            .with_max_entries(2);
        cache.set("k1", b"a", 1, "f1", "cbor", 1, 10).await.unwrap();
        cache.set("k2", b"b", 2, "f2", "cbor", 1, 20).await.unwrap();
        cache.set("k3", b"c", 3, "f3", "cbor", 1, 30).await.unwrap();

        let keys = cache.keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(!keys.contains(&"k1".to_string()), "oldest entry should be evicted");
    }

    #[async_std::test]
    async fn delete_and_clear() {
        let store = MemoryStore::new();
        let snapshots = FakeSnapshots::new();
        let cache = CheckpointCache::new("refs/warp/g1/seek-cache", &store, &store, &snapshots);
        cache.set("k1", b"a", 1, "f1", "cbor", 1, 10).await.unwrap();
        cache.delete("k1").await.unwrap();
        assert!(!cache.has("k1").await.unwrap());

        cache.set("k2", b"b", 2, "f2", "cbor", 1, 20).await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.keys().await.unwrap().is_empty());
    }
}
