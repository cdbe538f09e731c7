//! Pool usage statistics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Statistics about a connection pool
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of resources created by the factory
    pub created: usize,

    /// Number of resources handed back to the factory for destruction
    pub destroyed: usize,

    /// Number of successful acquires
    pub checkouts: usize,

    /// Number of resources returned to the free queue
    pub returns: usize,

    /// Number of acquires that had to block before completing
    pub waits: usize,

    /// Number of acquires or drains that gave up at their deadline
    pub timeouts: usize,

    /// Number of acquires refused because the pool was closing or shut down
    pub rejected: usize,

    /// Longest time an acquire spent blocked (microseconds)
    pub max_wait_us: u64,
}

impl PoolStats {
    /// Resources currently checked out according to the counters.
    pub fn outstanding(&self) -> usize {
        self.checkouts.saturating_sub(self.returns)
    }

    pub(crate) fn record_wait(&mut self, waited: Duration) {
        self.waits += 1;
        let waited_us = waited.as_micros() as u64;
        if waited_us > self.max_wait_us {
            self.max_wait_us = waited_us;
        }
    }
}
