//! Simulated database connections
//!
//! Stands in for a real client library so the harness can exercise the pool
//! without a server. Connections answer `SELECT id FROM test_table WHERE id = ?`
//! against a table holding ids `1..=table_rows`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpool_core::{ConnectionParams, ResourceFactory, SlotId};
use log::{debug, trace};
use thiserror::Error;

/// Errors raised by the simulated server
#[derive(Debug, Error)]
pub enum SimulatedError {
    /// The server refused to open a connection
    #[error("connection to {endpoint} refused for slot {slot}")]
    ConnectRefused {
        /// Where the connection was headed
        endpoint: String,
        /// Slot that asked for it
        slot: SlotId,
    },
}

/// An open simulated connection
#[derive(Debug)]
pub struct SimulatedConnection {
    slot: SlotId,
    table_rows: u64,
    delay: Duration,
    queries: u64,
}

impl SimulatedConnection {
    /// Run `SELECT id FROM test_table WHERE id = {id} LIMIT 1`.
    ///
    /// Returns the matching id, or `None` when the row does not exist.
    pub fn select_id(&mut self, id: u64) -> Option<u64> {
        trace!(
            "slot {}: SELECT id FROM test_table WHERE id = {} LIMIT 1",
            self.slot,
            id
        );
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.queries += 1;
        (1..=self.table_rows).contains(&id).then_some(id)
    }

    /// Queries served by this connection so far.
    pub fn queries(&self) -> u64 {
        self.queries
    }
}

/// Opens and closes [`SimulatedConnection`]s
#[derive(Debug)]
pub struct SimulatedFactory {
    params: ConnectionParams,
    table_rows: u64,
    delay: Duration,
    fail_at: Option<usize>,
    counters: Arc<ConnectionCounters>,
}

/// Connections opened and closed by a [`SimulatedFactory`]
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ConnectionCounters {
    /// Connections opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SimulatedFactory {
    /// Create a factory connecting with `params` to a table of `table_rows` rows.
    pub fn new(params: ConnectionParams, table_rows: u64) -> Self {
        Self {
            params,
            table_rows,
            delay: Duration::ZERO,
            fail_at: None,
            counters: Arc::new(ConnectionCounters::default()),
        }
    }

    /// Add latency to every query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Refuse the connection for `slot`.
    pub fn failing_at(mut self, slot: Option<usize>) -> Self {
        self.fail_at = slot;
        self
    }

    /// Shared open/close counters, still readable after the pool is gone.
    pub fn counters(&self) -> Arc<ConnectionCounters> {
        Arc::clone(&self.counters)
    }
}

impl ResourceFactory for SimulatedFactory {
    type Resource = SimulatedConnection;
    type Error = SimulatedError;

    fn create(&self, slot: SlotId) -> Result<SimulatedConnection, SimulatedError> {
        if self.fail_at == Some(slot.index()) {
            return Err(SimulatedError::ConnectRefused {
                endpoint: self.params.endpoint(),
                slot,
            });
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened connection {} to {}", slot, self.params.endpoint());
        Ok(SimulatedConnection {
            slot,
            table_rows: self.table_rows,
            delay: self.delay,
            queries: 0,
        })
    }

    fn destroy(&self, slot: SlotId, connection: SimulatedConnection) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Closed connection {} after {} queries",
            slot,
            connection.queries()
        );
    }
}
