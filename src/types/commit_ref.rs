// ABOUTME: Git reference validation (commit hashes, tags, branch names).
// ABOUTME: Rejects values that could be parsed as command-line options.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitRefError {
    #[error("commit reference cannot be empty")]
    Empty,

    #[error("commit reference cannot start with '-'")]
    LeadingDash,

    #[error("commit reference contains whitespace or control characters")]
    InvalidChar,
}

/// A reference that `git checkout` can resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(value: &str) -> Result<Self, CommitRefError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CommitRefError::Empty);
        }
        if value.starts_with('-') {
            return Err(CommitRefError::LeadingDash);
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CommitRefError::InvalidChar);
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for progress output.
    pub fn short(&self) -> &str {
        let is_hash = self.0.len() >= 12 && self.0.chars().all(|c| c.is_ascii_hexdigit());
        if is_hash { &self.0[..12] } else { &self.0 }
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CommitRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CommitRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        CommitRef::new(&value).map_err(serde::de::Error::custom)
    }
}
