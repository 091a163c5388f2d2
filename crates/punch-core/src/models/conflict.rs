//! Conflict policy and conflict record models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// How a divergence between a local mutation and the remote record is settled,
/// in order of increasing manual involvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Local version is kept
    LocalWins,
    /// Remote version is kept
    ServerWins,
    /// Later timestamp wins; exact ties go to the server
    #[default]
    NewestWins,
    /// A human must pick a version
    Manual,
}

impl ConflictPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::ServerWins => "server_wins",
            Self::NewestWins => "newest_wins",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_wins" | "local" => Ok(Self::LocalWins),
            "server_wins" | "server" | "remote" => Ok(Self::ServerWins),
            "newest_wins" | "newest" => Ok(Self::NewestWins),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown conflict policy '{other}'")),
        }
    }
}

/// Remote version of an entity returned when the server rejects a mutation
/// as conflicting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remote payload
    pub data: Value,
    /// Remote last-update timestamp (Unix ms)
    pub updated_at: i64,
}

/// Both sides of a divergence plus the meaningful fields that differ.
///
/// Only lives for the duration of one sync attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    /// Local payload
    pub local: Value,
    /// Local mutation timestamp (Unix ms)
    pub local_timestamp: i64,
    /// Remote version
    pub remote: RemoteRecord,
    /// Names of differing fields
    pub fields: Vec<&'static str>,
}

impl ConflictRecord {
    /// True when at least one meaningful field differs
    pub fn is_conflict(&self) -> bool {
        !self.fields.is_empty()
    }
}
