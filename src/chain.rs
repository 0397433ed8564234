//! Walks a single writer's first-parent patch chain back to a boundary
//! commit (exclusive) or the chain root, decoding every patch along the way
//! Used by sync and the materialization engine to fold only the new part of a chain.

use crate::codec;
use crate::error::{Result, WarpError};
use crate::ids::{CommitId, GraphName, WriterId};
use crate::patch::{Patch, PatchEnvelope};
use crate::store::{BlobPort, CommitPort};

/// Walks `writer`'s chain from `tip` backward to `boundary` (exclusive) or
/// the root, returning decoded patches in chronological (oldest-first)
/// order alongside the commit each was read from.
pub struct PatchChainLoader<'a> {
    commits: &'a dyn CommitPort,
    blobs: &'a dyn BlobPort,
}

impl<'a> PatchChainLoader<'a> {
    pub fn new(commits: &'a dyn CommitPort, blobs: &'a dyn BlobPort) -> Self {
        Self { commits, blobs }
    }

    pub async fn load(
        &self,
        graph: &GraphName,
        writer: &WriterId,
        tip: &CommitId,
        boundary: Option<&CommitId>,
    ) -> Result<Vec<(CommitId, Patch)>> {
        let mut collected = Vec::new();
        let mut cursor = Some(tip.clone());
        let mut reached_boundary = boundary.is_none();

        while let Some(current) = cursor {
            if Some(&current) == boundary {
                reached_boundary = true;
                break;
            }

            let info = self.commits.get_node_info(current.as_str()).await?;
            let envelope = PatchEnvelope::parse(&info.message).ok_or_else(|| WarpError::NotPatch {
                sha: current.as_str().to_string(),
            })?;

            if envelope.graph != graph.as_str() {
                return Err(WarpError::GraphMismatch {
                    expected: graph.as_str().to_string(),
                    found: envelope.graph,
                });
            }

            let blob = self.blobs.read_blob(&envelope.patch_oid).await?;
            let patch: Patch = codec::decode(&blob)?;

            collected.push((current.clone(), patch));
            cursor = info
                .parents
                .first()
                .map(|sha| CommitId::new(sha.clone()))
                .transpose()?;
        }

        if !reached_boundary {
            let boundary = boundary.expect("reached_boundary starts true when boundary is None");
            return Err(WarpError::Divergence {
                writer: writer.to_string(),
                boundary: boundary.as_str().to_string(),
                tip: tip.as_str().to_string(),
            });
        }

        collected.reverse();
        Ok(collected)
    }
}
