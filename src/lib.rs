//! # warpgraph-core
//!
//! A distributed, multi-writer, versioned graph CRDT engine built on top of
//! a content-addressed object store (the same shape as a git object
//! database: content-addressed blobs, commit nodes with parent pointers,
//! mutable refs).
//!
//! ## Shape of the system
//!
//! Each writer owns an append-only chain of commits in a graph's namespace.
//! A commit's message embeds a [`patch::PatchEnvelope`] pointing at a blob
//! holding the actual [`patch::Patch`] — a CRDT mutation expressed as a
//! list of [`patch::Op`]s against an observed-remove set ([`orset::ORSet`])
//! of nodes and edges, plus last-writer-wins registers ([`lww`]) for
//! properties.
//!
//! [`reducer::apply_patch`] folds one patch into a [`state::GraphState`];
//! [`chain::PatchChainLoader`] walks a writer's chain back to a boundary;
//! [`engine::MaterializationEngine`] ties chain-walking, reduction, and
//! checkpointing ([`checkpoint::CheckpointCache`]) together into the
//! façade most callers use. [`sync`] computes and applies the delta
//! between two replicas' [`frontier::Frontier`]s. [`wormhole`] compresses
//! a contiguous single-writer commit range into a composable unit for
//! cheap long-range sync. [`fork`] creates an isolated namespace rooted at
//! a validated ancestor of an existing chain. [`provenance_index`] tracks
//! which patches touched which entities, for slice materialization
//! ([`engine::MaterializationEngine::materialize_slice`]).
//!
//! Every port this crate depends on — commits, blobs, trees, refs, config
//! — is a narrow async trait in [`store`]; [`memory_store::MemoryStore`]
//! is the in-memory implementation used by this crate's own tests.

pub mod chain;
pub mod checkpoint;
pub mod clock;
pub mod codec;
pub mod engine;
pub mod error;
pub mod fork;
pub mod frontier;
pub mod ids;
pub mod lww;
pub mod memory_store;
pub mod orset;
pub mod patch;
pub mod provenance;
pub mod provenance_index;
pub mod record_stream;
pub mod reducer;
pub mod state;
pub mod store;
pub mod sync;
pub mod wormhole;

pub use clock::{Dot, VersionVector};
pub use engine::{
    CheckpointPolicy, DeleteMode, MaterializationEngine, MaterializationOptions, SliceResult,
};
pub use error::{ErrorKind, Result, WarpError};
pub use fork::{fork, ForkResult};
pub use frontier::{compute_sync_delta, Frontier, NeededRange, SyncDelta};
pub use ids::{CommitId, GraphName, WriterId};
pub use patch::{Op, Patch, PatchEnvelope, PropValue, PATCH_SCHEMA};
pub use provenance::{ProvenanceEntry, ProvenancePayload};
pub use provenance_index::{causal_cone, ProvenanceIndex};
pub use record_stream::{parse_records, AbortHandle, Chunk, Record};
pub use state::GraphState;
pub use store::{BlobPort, CommitPort, ConfigPort, RefPort, TreePort};
pub use wormhole::{compose_wormholes, create_wormhole, replay_wormhole, ContiguityCheck, Wormhole};
