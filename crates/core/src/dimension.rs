// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dimensional addresses.
//!
//! Each re-entry of an activity within the same job (cycle back-edge,
//! repeated hook, looping child) appends a fresh integer suffix to the
//! activity's dimensional path. The tuple `(jid, aid, dad)` uniquely
//! identifies one process record; records are always appended, never reused.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// A `/`-joined integer path addressing one occurrence of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimension(String);

impl Dimension {
    /// Root dimension for first entry.
    pub fn root() -> Self {
        Self("/0".to_string())
    }

    /// Top-level dimension for re-entry ordinal `index` (`/0` is the
    /// first entry; cycles allocate `/1`, `/2`, …).
    pub fn at(index: u32) -> Self {
        Self(format!("/{index}"))
    }

    /// Parse and validate a dimension path.
    pub fn parse(path: &str) -> Result<Self, CoreError> {
        if !path.starts_with('/') {
            return Err(CoreError::InvalidDimension(path.to_string()));
        }
        for seg in path[1..].split('/') {
            if seg.is_empty() || seg.parse::<u32>().is_err() {
                return Err(CoreError::InvalidDimension(path.to_string()));
            }
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a child index, producing the address of a nested entry.
    pub fn descend(&self, index: u32) -> Self {
        Self(format!("{}/{}", self.0, index))
    }

    /// Replace the final index with `index + 1`, producing the address a
    /// cycle re-entry writes to. `/0/2` bumps to `/0/3`.
    pub fn bump(&self) -> Self {
        match self.0.rfind('/') {
            Some(pos) => {
                let last: u32 = self.0[pos + 1..].parse().unwrap_or(0);
                Self(format!("{}/{}", &self.0[..pos], last + 1))
            }
            None => Self::root(),
        }
    }

    /// Number of path segments.
    pub fn depth(&self) -> usize {
        self.0[1..].split('/').count()
    }

    /// Compare by numeric segments (for export timeline ordering).
    pub fn numeric_key(&self) -> Vec<u32> {
        self.0[1..]
            .split('/')
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Self::root()
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Dimension {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
#[path = "dimension_tests.rs"]
mod tests;
