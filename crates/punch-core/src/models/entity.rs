//! Entity kinds and mutation operations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of record a queued mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    TimeEntry,
    MileageEntry,
    Employee,
    Project,
    Task,
}

impl EntityKind {
    /// Stable wire name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimeEntry => "time_entry",
            Self::MileageEntry => "mileage_entry",
            Self::Employee => "employee",
            Self::Project => "project",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "time_entry" => Ok(Self::TimeEntry),
            "mileage_entry" => Ok(Self::MileageEntry),
            "employee" => Ok(Self::Employee),
            "project" => Ok(Self::Project),
            "task" => Ok(Self::Task),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

/// Mutation applied to the target entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown operation '{other}'")),
        }
    }
}
