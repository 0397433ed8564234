//! The patch schema (v2).

use crate::clock::{Dot, VersionVector};
use crate::ids::WriterId;
use serde::{Deserialize, Serialize};

pub const PATCH_SCHEMA: u32 = 2;

/// One mutation to the graph. `observed_dots` lists denote dots a removal
/// observed at authoring time, per the OR-Set removal contract.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Op {
    NodeAdd {
        node: String,
        dot: Dot<WriterId>,
    },
    NodeRemove {
        observed_dots: Vec<Dot<WriterId>>,
    },
    NodeTombstone {
        node: String,
        observed_dots: Vec<Dot<WriterId>>,
    },
    EdgeAdd {
        from: String,
        to: String,
        label: String,
        dot: Dot<WriterId>,
    },
    EdgeTombstone {
        from: String,
        to: String,
        label: String,
        observed_dots: Vec<Dot<WriterId>>,
    },
    EdgeRemove {
        from: String,
        to: String,
        label: String,
        observed_dots: Vec<Dot<WriterId>>,
    },
    PropSet {
        node: String,
        key: String,
        value: PropValue,
    },
    EdgePropSet {
        from: String,
        to: String,
        label: String,
        key: String,
        value: PropValue,
    },
}

/// A property value. Kept as a small closed set of primitives rather than
/// an open-ended `serde_json::Value` — the codec is CBOR, not JSON, and the
/// reducer never needs to interpret values beyond LWW comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// A single logical update authored by one writer (v2 schema).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub schema: u32,
    pub writer: WriterId,
    pub lamport: u64,
    pub context: VersionVector<WriterId>,
    pub ops: Vec<Op>,
    pub reads: Option<Vec<String>>,
    pub writes: Option<Vec<String>>,
}

impl Eq for PropValue {}

impl Patch {
    /// Builds a patch whose `lamport` is derived from `context`:
    /// `lamport = 1 + max(observedFrontier)`.
    pub fn new(writer: WriterId, context: VersionVector<WriterId>, ops: Vec<Op>) -> Self {
        let lamport = 1 + context.max();
        Self {
            schema: PATCH_SCHEMA,
            writer,
            lamport,
            context,
            ops,
            reads: None,
            writes: None,
        }
    }

    pub fn with_provenance(mut self, reads: Vec<String>, writes: Vec<String>) -> Self {
        self.reads = Some(reads);
        self.writes = Some(writes);
        self
    }

    /// The dot this patch's `(writer, lamport)` pair represents.
    pub fn dot(&self) -> Dot<WriterId> {
        Dot::new(self.writer.clone(), self.lamport)
    }
}

/// The envelope a patch commit's message carries:
/// `(graph, writer, lamport, patchOid, schema)`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PatchEnvelope {
    pub graph: String,
    pub writer: WriterId,
    pub lamport: u64,
    pub patch_oid: String,
    pub schema: u32,
}

impl PatchEnvelope {
    /// Parses the commit-message encoding used by [`crate::chain`]. The
    /// wire format is a single line of `key=value` fields separated by
    /// tabs, chosen (like the record-stream NUL delimiter) to avoid any
    /// byte the object store's commit message format might reinterpret.
    pub fn parse(message: &str) -> Option<Self> {
        let mut graph = None;
        let mut writer = None;
        let mut lamport = None;
        let mut patch_oid = None;
        let mut schema = None;
        for field in message.trim_end().split('\t') {
            let (key, value) = field.split_once('=')?;
            match key {
                "graph" => graph = Some(value.to_string()),
                "writer" => writer = WriterId::new(value).ok(),
                "lamport" => lamport = value.parse().ok(),
                "patch_oid" => patch_oid = Some(value.to_string()),
                "schema" => schema = value.parse().ok(),
                _ => {}
            }
        }
        Some(Self {
            graph: graph?,
            writer: writer?,
            lamport: lamport?,
            patch_oid: patch_oid?,
            schema: schema?,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "graph={}\twriter={}\tlamport={}\tpatch_oid={}\tschema={}",
            self.graph, self.writer, self.lamport, self.patch_oid, self.schema
        )
    }
}
