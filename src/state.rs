//! `GraphState`: the materialized value of the graph at some observed
//! frontier, plus the canonical key encoding used to address node/edge
//! properties.

use crate::clock::VersionVector;
use crate::ids::WriterId;
use crate::lww::LWWRegister;
use crate::orset::ORSet;
use crate::patch::PropValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `\0` separates `(from, to, label)` in an edge key and `(node, name)` in a
/// property key. A valid identifier must not contain it.
pub const SEP: char = '\0';
/// Byte that never begins a valid node identifier, used to make the node-
/// property and edge-property key namespaces disjoint.
pub const EDGE_PROP_PREFIX: char = '\u{1}';

/// Encodes `(from, to, label)` into the edge identity used by `edgeAlive`.
pub fn encode_edge_key(from: &str, to: &str, label: &str) -> String {
    format!("{from}{SEP}{to}{SEP}{label}")
}

/// Inverse of [`encode_edge_key`]. Returns `None` if `key` was not produced
/// by it (wrong number of fields).
pub fn decode_edge_key(key: &str) -> Option<(String, String, String)> {
    let mut parts = key.split(SEP);
    let from = parts.next()?.to_string();
    let to = parts.next()?.to_string();
    let label = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }
    Some((from, to, label))
}

/// Encodes a node-property key: `node ∥ SEP ∥ name`.
pub fn encode_prop_key(node: &str, name: &str) -> String {
    format!("{node}{SEP}{name}")
}

pub fn decode_prop_key(key: &str) -> Option<(String, String)> {
    if key.starts_with(EDGE_PROP_PREFIX) {
        return None;
    }
    let (node, name) = key.split_once(SEP)?;
    Some((node.to_string(), name.to_string()))
}

/// Encodes an edge-property key: `EDGE_PROP_PREFIX ∥ from ∥ SEP ∥ to ∥ SEP ∥ label ∥ SEP ∥ name`.
pub fn encode_edge_prop_key(from: &str, to: &str, label: &str, name: &str) -> String {
    format!("{EDGE_PROP_PREFIX}{from}{SEP}{to}{SEP}{label}{SEP}{name}")
}

pub fn decode_edge_prop_key(key: &str) -> Option<(String, String, String, String)> {
    let rest = key.strip_prefix(EDGE_PROP_PREFIX)?;
    let mut parts = rest.split(SEP);
    let from = parts.next()?.to_string();
    let to = parts.next()?.to_string();
    let label = parts.next()?.to_string();
    let name = parts.next()?.to_string();
    if parts.next().is_some() {
        return None;
    }
    Some((from, to, label, name))
}

/// Identifiers may not contain `SEP` or `EDGE_PROP_PREFIX`; this is the
/// precondition the key-encoding round-trip relies on.
pub fn is_valid_identifier(s: &str) -> bool {
    !s.contains(SEP) && !s.contains(EDGE_PROP_PREFIX)
}

/// The materialized value of the graph at some observed frontier.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphState {
    pub node_alive: ORSet<String, WriterId>,
    pub edge_alive: ORSet<String, WriterId>,
    pub prop: BTreeMap<String, LWWRegister<PropValue, WriterId>>,
    pub observed_frontier: VersionVector<WriterId>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.node_alive.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = (String, String, String)> + '_ {
        self.edge_alive.iter().filter_map(|key| decode_edge_key(key))
    }

    pub fn node_prop(&self, node: &str, name: &str) -> Option<&PropValue> {
        self.prop.get(&encode_prop_key(node, name))?.get()
    }

    pub fn edge_prop(&self, from: &str, to: &str, label: &str, name: &str) -> Option<&PropValue> {
        self.prop
            .get(&encode_edge_prop_key(from, to, label, name))?
            .get()
    }
}
