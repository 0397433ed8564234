//! Stable, machine-readable error kinds.
//!
//! Every variant carries a `[CODE]` string in its `Display` impl (the
//! convention borrowed from `echo-cas::CasError`) so that a logged error
//! message alone is enough to grep for the offending call site.

use std::fmt;

/// The classification a [`WarpError`] belongs to, used by call sites that
/// want to decide programmatically whether to retry, surface, or swallow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Bad argument shape or type. Never retried.
    Validation,
    /// Requested commit/blob/ref absent.
    NotFound,
    /// Causal or structural violation (divergence, multi-writer range, ...).
    Causal,
    /// Ref compare-and-swap mismatch. Retryable, but this crate never
    /// retries automatically — callers decide.
    Concurrency,
    /// Transient I/O failure, e.g. a cache index write race.
    Transient,
    /// Operation was cancelled via an abort handle.
    Cancelled,
}

/// The single error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum WarpError {
    #[error("[E_WORMHOLE_SHA_NOT_FOUND] commit {sha} not found")]
    WormholeShaNotFound { sha: String },

    #[error("[E_WORMHOLE_INVALID_RANGE] {from}..{to}: {reason}")]
    WormholeInvalidRange {
        from: String,
        to: String,
        reason: String,
    },

    #[error("[E_WORMHOLE_MULTI_WRITER] expected writer {expected}, found {found}")]
    WormholeMultiWriter { expected: String, found: String },

    #[error("[E_WORMHOLE_EMPTY_RANGE] {from}..{to} contains no patches")]
    WormholeEmptyRange { from: String, to: String },

    #[error("[E_WORMHOLE_NOT_PATCH] commit {sha} is not a patch envelope")]
    WormholeNotPatch { sha: String },

    #[error("[E_FORK_INVALID_ARGS] {reason}")]
    ForkInvalidArgs { reason: String },

    #[error("[E_FORK_WRITER_NOT_FOUND] writer {writer} has no chain in graph {graph}")]
    ForkWriterNotFound { graph: String, writer: String },

    #[error("[E_FORK_PATCH_NOT_FOUND] commit {sha} not found")]
    ForkPatchNotFound { sha: String },

    #[error("[E_FORK_PATCH_NOT_IN_CHAIN] commit {sha} is not an ancestor of writer {writer}'s tip")]
    ForkPatchNotInChain { sha: String, writer: String },

    #[error("[E_FORK_NAME_INVALID] graph name {name:?} is invalid")]
    ForkNameInvalid { name: String },

    #[error("[E_FORK_ALREADY_EXISTS] graph {name} already exists")]
    ForkAlreadyExists { name: String },

    #[error("[E_FORK_WRITER_ID_INVALID] writer id {writer:?} is invalid")]
    ForkWriterIdInvalid { writer: String },

    #[error("[E_NO_STATE] materialize() must be called before this operation")]
    NoState,

    #[error("[OPERATION_ABORTED] {context}")]
    OperationAborted { context: String },

    #[error("[PAYLOAD_TOO_LARGE] {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("[DIVERGENCE] writer {writer}: boundary {boundary} not reached from tip {tip}")]
    Divergence {
        writer: String,
        boundary: String,
        tip: String,
    },

    #[error("[NOT_PATCH] commit {sha} message is not a patch envelope")]
    NotPatch { sha: String },

    #[error("[GRAPH_MISMATCH] expected graph {expected}, patch carries {found}")]
    GraphMismatch { expected: String, found: String },

    #[error("[INVALID_OP] operation missing required field {field}")]
    InvalidOp { field: String },

    #[error("[SCHEMA_UNSUPPORTED] patch schema {schema} is not recognized")]
    SchemaUnsupported { schema: u32 },

    #[error("[OUT_OF_ORDER] writer {writer}: lamport {lamport} observed below frontier {frontier}")]
    OutOfOrder {
        writer: String,
        lamport: u64,
        frontier: u64,
    },

    #[error("[INVALID_WORMHOLE_JSON] missing or malformed field {field}")]
    InvalidWormholeJson { field: String },

    #[error("[REF_CONFLICT] ref {ref_name} expected {expected:?}, found {found:?}")]
    RefConflict {
        ref_name: String,
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("[VALIDATION] {reason}")]
    Validation { reason: String },

    #[error("[NOT_FOUND] {what} {id} not found")]
    NotFound { what: String, id: String },

    #[error("[TRANSIENT] {reason} (after {attempts} attempts)")]
    Transient { reason: String, attempts: u32 },

    #[error("[CODEC] {reason}")]
    Codec { reason: String },

    #[error("[PORT] {reason}")]
    Port { reason: String },
}

impl WarpError {
    /// Returns the [`ErrorKind`] this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use WarpError::*;
        match self {
            WormholeShaNotFound { .. } | ForkPatchNotFound { .. } | NotFound { .. } => {
                ErrorKind::NotFound
            }
            WormholeInvalidRange { .. }
            | WormholeMultiWriter { .. }
            | WormholeEmptyRange { .. }
            | WormholeNotPatch { .. }
            | Divergence { .. }
            | NotPatch { .. }
            | GraphMismatch { .. }
            | ForkPatchNotInChain { .. } => ErrorKind::Causal,
            RefConflict { .. } => ErrorKind::Concurrency,
            Transient { .. } => ErrorKind::Transient,
            OperationAborted { .. } => ErrorKind::Cancelled,
            _ => ErrorKind::Validation,
        }
    }
}

/// Convenience constructor for [`WarpError::Validation`].
pub fn validation(reason: impl fmt::Display) -> WarpError {
    WarpError::Validation {
        reason: reason.to_string(),
    }
}

/// Convenience constructor for [`WarpError::Port`], used by port adapters
/// to wrap collaborator-specific errors without leaking their type.
pub fn port_error(reason: impl fmt::Display) -> WarpError {
    WarpError::Port {
        reason: reason.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, WarpError>;
