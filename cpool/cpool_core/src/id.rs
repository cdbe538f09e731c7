//! Identifiers for pools and the slots inside them.
//!
//! A [`PoolId`] is a random UUID minted when a pool is constructed; it lets a
//! pool recognise checkouts that belong to some other pool. A [`SlotId`] is
//! the stable index of a resource inside its pool's slot array.
//!
//! # Examples
//!
//! ```
//! use cpool_core::id::{PoolId, SlotId};
//! use std::str::FromStr;
//!
//! let a = PoolId::new();
//! let b = PoolId::new();
//! assert_ne!(a, b);
//!
//! let parsed = PoolId::from_str(&a.to_string()).unwrap();
//! assert_eq!(parsed, a);
//!
//! assert_eq!(SlotId::new(3).index(), 3);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a single pool instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(Uuid);

impl PoolId {
    /// Create a new random pool identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PoolId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Position of a resource in its pool's slot array.
///
/// Slot ids are assigned `0..capacity` at construction and never change; they
/// double as the resource's identity for the lifetime of the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(usize);

impl SlotId {
    /// Wrap a raw slot index.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw slot index.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for SlotId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
