//! Wormholes: validated, composable summaries of a contiguous single-writer
//! commit range that preserve exact replay.

use crate::error::{Result, WarpError};
use crate::ids::{CommitId, WriterId};
use crate::patch::PatchEnvelope;
use crate::provenance::ProvenancePayload;
use crate::state::GraphState;
use crate::store::{BlobPort, CommitPort};
use serde_json::{Map, Value};

/// `(fromSha, toSha, writerId, patchCount, payload)`. `from_sha` is the
/// oldest-included ancestor of
/// `to_sha` in `writer_id`'s chain; `payload` is ordered oldest-first.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Wormhole {
    pub from_sha: CommitId,
    pub to_sha: CommitId,
    pub writer_id: WriterId,
    pub patch_count: u64,
    pub payload: ProvenancePayload,
}

/// Walks `to_sha`'s first-parent chain back to and including `from_sha`,
/// verifying every commit belongs to `graph_name` and was authored by a
/// single writer.
pub async fn create_wormhole(
    commits: &dyn CommitPort,
    blobs: &dyn BlobPort,
    from_sha: &CommitId,
    to_sha: &CommitId,
    graph_name: &str,
) -> Result<Wormhole> {
    if !commits.node_exists(from_sha.as_str()).await? {
        return Err(WarpError::WormholeShaNotFound {
            sha: from_sha.as_str().to_string(),
        });
    }
    if !commits.node_exists(to_sha.as_str()).await? {
        return Err(WarpError::WormholeShaNotFound {
            sha: to_sha.as_str().to_string(),
        });
    }

    let mut payload = ProvenancePayload::identity();
    let mut writer_id: Option<WriterId> = None;
    let mut cursor = Some(to_sha.clone());
    let mut reached_from = false;

    while let Some(current) = cursor {
        let info = commits.get_node_info(current.as_str()).await?;
        let envelope = PatchEnvelope::parse(&info.message).ok_or_else(|| WarpError::WormholeNotPatch {
            sha: current.as_str().to_string(),
        })?;

        if envelope.graph != graph_name {
            return Err(WarpError::WormholeInvalidRange {
                from: from_sha.as_str().to_string(),
                to: to_sha.as_str().to_string(),
                reason: format!("commit {current} belongs to graph {:?}, not {graph_name:?}", envelope.graph),
            });
        }

        match &writer_id {
            None => writer_id = Some(envelope.writer.clone()),
            Some(expected) if *expected != envelope.writer => {
                return Err(WarpError::WormholeMultiWriter {
                    expected: expected.to_string(),
                    found: envelope.writer.to_string(),
                });
            }
            Some(_) => {}
        }

        let blob = blobs.read_blob(&envelope.patch_oid).await?;
        let patch = crate::codec::decode(&blob)?;
        payload.push(current.clone(), patch);

        if current == *from_sha {
            reached_from = true;
            break;
        }

        cursor = info
            .parents
            .first()
            .map(|sha| CommitId::new(sha.clone()))
            .transpose()?;
    }

    if !reached_from {
        return Err(WarpError::WormholeInvalidRange {
            from: from_sha.as_str().to_string(),
            to: to_sha.as_str().to_string(),
            reason: "chain root reached before from_sha".to_string(),
        });
    }
    if payload.is_empty() {
        return Err(WarpError::WormholeEmptyRange {
            from: from_sha.as_str().to_string(),
            to: to_sha.as_str().to_string(),
        });
    }

    // Collected newest-first (we walked backward); ProvenancePayload must be
    // oldest-first.
    let entries: Vec<_> = payload.entries().iter().cloned().rev().collect();
    let payload = ProvenancePayload::from_entries(entries);
    let patch_count = payload.len() as u64;

    Ok(Wormhole {
        from_sha: from_sha.clone(),
        to_sha: to_sha.clone(),
        writer_id: writer_id.expect("at least one patch was collected"),
        patch_count,
        payload,
    })
}

/// An optional contiguity check for [`compose_wormholes`]: when present,
/// `b.from_sha`'s parent chain must include `a.to_sha`.
pub struct ContiguityCheck<'a> {
    pub commits: &'a dyn CommitPort,
}

/// Concatenates `a` followed by `b` into a single wormhole spanning
/// `a.from_sha..b.to_sha`. Fails with `MULTI_WRITER` if the two wormholes
/// were authored by different writers.
pub async fn compose_wormholes(a: &Wormhole, b: &Wormhole, contiguity: Option<ContiguityCheck<'_>>) -> Result<Wormhole> {
    if a.writer_id != b.writer_id {
        return Err(WarpError::WormholeMultiWriter {
            expected: a.writer_id.to_string(),
            found: b.writer_id.to_string(),
        });
    }

    if let Some(check) = contiguity {
        let info = check.commits.get_node_info(b.from_sha.as_str()).await?;
        if !info.parents.iter().any(|p| p.as_str() == a.to_sha.as_str()) {
            return Err(WarpError::WormholeInvalidRange {
                from: a.from_sha.as_str().to_string(),
                to: b.to_sha.as_str().to_string(),
                reason: format!("{} is not a parent of {}", a.to_sha, b.from_sha),
            });
        }
    }

    Ok(Wormhole {
        from_sha: a.from_sha.clone(),
        to_sha: b.to_sha.clone(),
        writer_id: a.writer_id.clone(),
        patch_count: a.patch_count + b.patch_count,
        payload: a.payload.concat(&b.payload),
    })
}

/// Replays a wormhole's payload onto `initial` (or an empty state).
pub fn replay_wormhole(w: &Wormhole, initial: Option<GraphState>) -> Result<GraphState> {
    w.payload.replay(initial)
}

fn require_field<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    obj.get(field).ok_or_else(|| WarpError::InvalidWormholeJson {
        field: field.to_string(),
    })
}

fn require_str(obj: &Map<String, Value>, field: &str) -> Result<String> {
    require_field(obj, field)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| WarpError::InvalidWormholeJson {
            field: field.to_string(),
        })
}

impl Wormhole {
    /// Serializes to the self-describing JSON shape `{fromSha, toSha,
    /// writerId, patchCount, payload}`.
    pub fn serialize(&self) -> Result<Value> {
        let payload_bytes = self.payload.to_binary()?;
        let mut obj = Map::new();
        obj.insert("fromSha".to_string(), Value::String(self.from_sha.as_str().to_string()));
        obj.insert("toSha".to_string(), Value::String(self.to_sha.as_str().to_string()));
        obj.insert("writerId".to_string(), Value::String(self.writer_id.as_str().to_string()));
        obj.insert("patchCount".to_string(), Value::Number(self.patch_count.into()));
        obj.insert("payload".to_string(), Value::String(hex::encode(payload_bytes)));
        Ok(Value::Object(obj))
    }

    /// Deserializes from the shape produced by [`serialize`](Self::serialize).
    /// Any missing required field fails with `INVALID_WORMHOLE_JSON`.
    pub fn deserialize(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| WarpError::InvalidWormholeJson {
            field: "<root>".to_string(),
        })?;

        let from_sha = CommitId::new(require_str(obj, "fromSha")?)?;
        let to_sha = CommitId::new(require_str(obj, "toSha")?)?;
        let writer_id = WriterId::new(require_str(obj, "writerId")?)?;
        let patch_count = require_field(obj, "patchCount")?
            .as_u64()
            .ok_or_else(|| WarpError::InvalidWormholeJson {
                field: "patchCount".to_string(),
            })?;
        let payload_hex = require_str(obj, "payload")?;
        let payload_bytes = hex::decode(&payload_hex).map_err(|err| WarpError::InvalidWormholeJson {
            field: format!("payload ({err})"),
        })?;
        let payload = ProvenancePayload::from_binary(&payload_bytes)?;

        Ok(Self {
            from_sha,
            to_sha,
            writer_id,
            patch_count,
            payload,
        })
    }
}
