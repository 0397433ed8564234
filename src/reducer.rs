//! The CRDT reducer: folds a [`Patch`] into a [`GraphState`].

use crate::error::{Result, WarpError};
use crate::ids::{CommitId, WriterId};
use crate::patch::{Op, Patch, PATCH_SCHEMA};
use crate::state::{encode_edge_key, encode_edge_prop_key, encode_prop_key, GraphState};

/// Applies a single patch to `state` in place.
///
/// Duplicate patches — identified by `(writer, lamport)` already covered by
/// `state.observed_frontier` — are silently ignored (idempotent replay).
/// Patches that skip ahead of the observed frontier for their writer are
/// rejected with `OutOfOrder`.
pub fn apply_patch(state: &mut GraphState, patch: &Patch, commit_id: &CommitId) -> Result<()> {
    if patch.schema != PATCH_SCHEMA {
        return Err(WarpError::SchemaUnsupported {
            schema: patch.schema,
        });
    }

    let observed = state.observed_frontier.get(&patch.writer);
    if patch.lamport <= observed {
        if patch.lamport < observed {
            return Err(WarpError::OutOfOrder {
                writer: patch.writer.to_string(),
                lamport: patch.lamport,
                frontier: observed,
            });
        }
        return Ok(());
    }

    for op in &patch.ops {
        apply_op(state, op, patch.lamport, &patch.writer, commit_id)?;
    }

    state
        .observed_frontier
        .observe(patch.writer.clone(), patch.lamport);
    Ok(())
}

fn apply_op(
    state: &mut GraphState,
    op: &Op,
    lamport: u64,
    writer: &WriterId,
    _commit_id: &CommitId,
) -> Result<()> {
    match op {
        Op::NodeAdd { node, dot } => {
            state.node_alive.add(node.clone(), dot.clone());
        }
        Op::NodeRemove { observed_dots } => {
            state.node_alive.remove_observed_dots(observed_dots.iter().cloned());
        }
        Op::NodeTombstone { node, observed_dots } => {
            state
                .node_alive
                .remove(node.clone(), observed_dots.iter().cloned());
        }
        Op::EdgeAdd { from, to, label, dot } => {
            let key = encode_edge_key(from, to, label);
            state.edge_alive.add(key, dot.clone());
        }
        Op::EdgeTombstone { from, to, label, observed_dots }
        | Op::EdgeRemove { from, to, label, observed_dots } => {
            let key = encode_edge_key(from, to, label);
            state.edge_alive.remove(key, observed_dots.iter().cloned());
        }
        Op::PropSet { node, key, value } => {
            let full_key = encode_prop_key(node, key);
            state
                .prop
                .entry(full_key)
                .or_default()
                .set(value.clone(), lamport, writer.clone());
        }
        Op::EdgePropSet { from, to, label, key, value } => {
            let full_key = encode_edge_prop_key(from, to, label, key);
            state
                .prop
                .entry(full_key)
                .or_default()
                .set(value.clone(), lamport, writer.clone());
        }
    }
    Ok(())
}

/// Folds a sequence of `(patch, commit_id)` pairs into `state` in list
/// order.
pub fn apply_patches<'a>(
    state: &mut GraphState,
    patches: impl IntoIterator<Item = (&'a Patch, &'a CommitId)>,
) -> Result<()> {
    for (patch, commit_id) in patches {
        apply_patch(state, patch, commit_id)?;
    }
    Ok(())
}
