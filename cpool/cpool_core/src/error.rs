//! Error types for the connection pool.
//!
//! Every pool operation reports failure through [`PoolError`]. Nothing is
//! retried internally: reconnecting or retrying a stale connection is left to
//! the caller.

use crate::id::SlotId;
use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by a resource factory.
pub type FactoryError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type used throughout the pool.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors returned by pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool configuration cannot be used (e.g. zero capacity)
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The factory failed to create the resource for a slot; the pool was
    /// not built and every resource created before it has been destroyed
    #[error("failed to create resource for slot {slot}: {source}")]
    ConstructionFailed {
        /// Slot whose resource could not be created
        slot: SlotId,
        /// Error reported by the factory
        #[source]
        source: FactoryError,
    },

    /// The pool is closing or has been shut down
    #[error("connection pool is closed")]
    PoolClosed,

    /// No resource is free right now (non-blocking acquire only)
    #[error("connection pool exhausted")]
    Exhausted,

    /// A deadline expired while waiting on the pool
    #[error("timed out after {0:?} waiting on the pool")]
    Timeout(Duration),

    /// The caller handed back something the pool never lent out
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// The resource behind a checkout was destroyed by a non-draining shutdown
    #[error("resource in slot {0} was destroyed by pool shutdown")]
    ResourceDestroyed(SlotId),
}

impl PoolError {
    /// Whether the caller may reasonably try again later.
    ///
    /// Construction and contract errors are permanent; a closed pool never
    /// reopens either.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Timeout(_))
    }
}
