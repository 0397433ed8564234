//! The object-store ports this crate consumes.
//!
//! Five narrow, asynchronous, fallible traits. Everything above this module
//! — reducer, provenance, chain, checkpoint, sync, wormhole, fork — is
//! written against these traits only, never against a concrete store, so
//! any content-addressed backend (on-disk git, a remote object service, the
//! in-memory [`crate::memory_store::MemoryStore`]) can serve them.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Metadata about a single commit node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: String,
    pub parents: Vec<String>,
}

/// Arguments to [`CommitPort::commit_node`].
#[derive(Clone, Debug, Default)]
pub struct CommitNodeArgs {
    pub message: String,
    pub parents: Vec<String>,
    pub sign: bool,
}

/// Arguments to [`CommitPort::commit_node_with_tree`].
#[derive(Clone, Debug)]
pub struct CommitNodeWithTreeArgs {
    pub tree_oid: String,
    pub parents: Vec<String>,
    pub message: String,
    pub sign: bool,
}

/// Options controlling [`CommitPort::log_nodes`] / [`CommitPort::log_nodes_stream`].
#[derive(Clone, Debug, Default)]
pub struct LogOptions {
    pub ref_name: String,
    pub limit: Option<u32>,
    pub skip_merges: bool,
}

/// Result of [`CommitPort::ping`].
#[derive(Clone, Copy, Debug)]
pub struct Ping {
    pub ok: bool,
    pub latency_ms: u64,
}

/// Commit-graph operations.
#[async_trait]
pub trait CommitPort: Send + Sync {
    async fn commit_node(&self, args: CommitNodeArgs) -> Result<String>;
    async fn commit_node_with_tree(&self, args: CommitNodeWithTreeArgs) -> Result<String>;
    async fn show_node(&self, sha: &str) -> Result<String>;
    async fn get_node_info(&self, sha: &str) -> Result<CommitInfo>;
    async fn log_nodes(&self, opts: LogOptions) -> Result<String>;
    async fn log_nodes_stream(&self, opts: LogOptions) -> Result<BoxStream<'static, Result<Vec<u8>>>>;
    async fn count_nodes(&self, ref_name: &str) -> Result<u64>;
    async fn node_exists(&self, sha: &str) -> Result<bool>;
    async fn get_commit_tree(&self, sha: &str) -> Result<String>;
    async fn ping(&self) -> Result<Ping>;
}

/// Content-addressed blob storage. Writing identical bytes MUST produce an
/// identical oid.
#[async_trait]
pub trait BlobPort: Send + Sync {
    async fn write_blob(&self, bytes: &[u8]) -> Result<String>;
    async fn read_blob(&self, oid: &str) -> Result<Vec<u8>>;
}

/// The well-known empty tree oid (git's canonical empty-tree SHA-1).
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Tree (directory listing) operations.
#[async_trait]
pub trait TreePort: Send + Sync {
    /// `entries` is a list of `"<mode> blob <oid>\t<path>"` lines.
    async fn write_tree(&self, entries: Vec<String>) -> Result<String>;
    async fn read_tree(&self, tree_oid: &str) -> Result<std::collections::BTreeMap<String, Vec<u8>>>;
    async fn read_tree_oids(&self, tree_oid: &str) -> Result<std::collections::BTreeMap<String, String>>;
}

/// Named reference (branch-like pointer) operations.
#[async_trait]
pub trait RefPort: Send + Sync {
    async fn update_ref(&self, ref_name: &str, oid: &str) -> Result<()>;
    async fn read_ref(&self, ref_name: &str) -> Result<Option<String>>;
    async fn delete_ref(&self, ref_name: &str) -> Result<()>;
    async fn list_refs(&self, prefix: &str) -> Result<Vec<String>>;
    /// Atomically sets `ref_name` to `new_oid` iff its current value equals
    /// `expected_oid` (`None` meaning "must not currently exist"). On
    /// mismatch, returns [`crate::error::WarpError::RefConflict`].
    async fn compare_and_swap_ref(
        &self,
        ref_name: &str,
        new_oid: &str,
        expected_oid: Option<&str>,
    ) -> Result<()>;
}

/// Per-repository string configuration, keyed `section.key`.
#[async_trait]
pub trait ConfigPort: Send + Sync {
    async fn config_get(&self, key: &str) -> Result<Option<String>>;
    async fn config_set(&self, key: &str, value: &str) -> Result<()>;
}

/// `oid`s are 40-char lowercase hex.
pub fn is_valid_oid(oid: &str) -> bool {
    oid.len() == 40 && oid.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Refs match `^(refs|HEAD)([A-Za-z0-9/_.-]+)?$` and must not start with `-`.
pub fn is_valid_ref(ref_name: &str) -> bool {
    if ref_name.starts_with('-') {
        return false;
    }
    let Some(rest) = ref_name
        .strip_prefix("refs")
        .or_else(|| ref_name.strip_prefix("HEAD"))
    else {
        return false;
    };
    rest.is_empty()
        || rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/_.-".contains(c))
}

/// Config keys follow git's `section.key` pattern: alphanumeric/`-`/`_`
/// segments separated by a single `.`.
pub fn is_valid_config_key(key: &str) -> bool {
    let Some((section, name)) = key.split_once('.') else {
        return false;
    };
    let valid_segment = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid_segment(section) && valid_segment(name)
}
