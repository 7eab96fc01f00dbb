//! Session and point identity types.
//!
//! A session is identified by a UUID supplied by the caller (or generated by
//! the CLI adapter). Points are identified by a caller-supplied string or a
//! deterministic id derived from their coordinates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Session ID for a single analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    /// Parse an existing session ID string.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(SessionId)
    }

    /// File name used when persisting a result into a directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of an input point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PointId(pub String);

impl PointId {
    /// Deterministic id derived from coordinates, six decimals each.
    pub fn from_coordinates(latitude: f64, longitude: f64) -> Self {
        PointId(format!("{:.6}_{:.6}", latitude, longitude))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PointId {
    fn from(s: &str) -> Self {
        PointId(s.to_string())
    }
}

impl From<String> for PointId {
    fn from(s: String) -> Self {
        PointId(s)
    }
}
