//! Opaque identifier newtypes shared across the crate.
//!
//! `WriterId` and `GraphName` wrap plain opaque strings; `CommitId` wraps
//! the 40-char lowercase hex SHA contract the object store validates
//! against.

use crate::error::{validation, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WriterId(String);

impl WriterId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.contains('\0') {
            return Err(validation(format!("invalid writer id {id:?}")));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WriterId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphName(String);

impl GraphName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(validation(format!("invalid graph name {name:?}")));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 40-char lowercase hex commit identifier.
#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(sha: impl Into<String>) -> Result<Self> {
        let sha = sha.into();
        let is_valid = sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase());
        if !is_valid {
            return Err(validation(format!("invalid commit id {sha:?}")));
        }
        Ok(Self(sha))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_id_requires_40_lowercase_hex() {
        assert!(CommitId::new("a".repeat(40)).is_ok());
        assert!(CommitId::new("A".repeat(40)).is_err());
        assert!(CommitId::new("a".repeat(39)).is_err());
        assert!(CommitId::new("g".repeat(40)).is_err());
    }

    #[test]
    fn writer_id_rejects_empty_and_nul() {
        assert!(WriterId::new("alice").is_ok());
        assert!(WriterId::new("").is_err());
        assert!(WriterId::new("a\0b").is_err());
    }

    #[test]
    fn graph_name_rejects_slash() {
        assert!(GraphName::new("my-graph").is_ok());
        assert!(GraphName::new("a/b").is_err());
    }
}
