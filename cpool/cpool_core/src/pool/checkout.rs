//! Exclusive handle to a checked-out resource.

use super::Shared;
use crate::error::Result;
use crate::factory::ResourceFactory;
use crate::id::{PoolId, SlotId};
use log::debug;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A resource taken from a [`ConnectionPool`](super::ConnectionPool).
///
/// The holder has the resource to itself until it releases the checkout,
/// either explicitly or by dropping it. Releasing consumes the handle, so a
/// checkout can only ever be returned once.
pub struct Checkout<F: ResourceFactory> {
    shared: Arc<Shared<F>>,
    slot: SlotId,
    acquired_at: Instant,
    released: bool,
}

impl<F: ResourceFactory> Checkout<F> {
    pub(crate) fn new(shared: Arc<Shared<F>>, slot: SlotId) -> Self {
        Self {
            shared,
            slot,
            acquired_at: Instant::now(),
            released: false,
        }
    }

    /// Slot identity of the held resource.
    pub fn id(&self) -> SlotId {
        self.slot
    }

    /// Identity of the pool this checkout came from.
    pub fn pool_id(&self) -> PoolId {
        self.shared.id()
    }

    /// Time since the resource was acquired.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Use the held resource.
    ///
    /// Fails with [`PoolError::ResourceDestroyed`](crate::PoolError::ResourceDestroyed)
    /// if a non-draining shutdown destroyed the resource while it was
    /// checked out.
    pub fn with<T>(&self, f: impl FnOnce(&mut F::Resource) -> T) -> Result<T> {
        self.shared.with_resource(self.slot, f)
    }

    /// Return the resource to its pool.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.shared.give_back(self.slot)
    }
}

impl<F: ResourceFactory> Drop for Checkout<F> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.shared.give_back(self.slot) {
            debug!("Dropped checkout of slot {} not returned: {}", self.slot, e);
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for Checkout<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkout")
            .field("pool", &self.shared.id())
            .field("slot", &self.slot)
            .field("held_for", &self.held_for())
            .finish()
    }
}
