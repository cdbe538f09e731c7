//! Fixed-capacity pool of pre-created resources.
//!
//! Every resource is created when the pool is built and lives in a slot of
//! an array that is never resized. Free slots form a FIFO queue threaded
//! through the array by index. One mutex guards the queue and the lifecycle
//! flags; two condition variables carry the signals:
//!
//! - `not_empty` wakes acquirers when a slot is returned or the pool closes
//! - `full` wakes a draining shutdown once every slot is back in the queue
//!
//! Shutdown is cooperative: it first closes the pool to new acquires,
//! optionally waits for every checkout to come back, then destroys each
//! resource exactly once.

pub mod checkout;
pub mod freelist;

pub use checkout::Checkout;
pub use freelist::FreeList;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::factory::ResourceFactory;
use crate::id::{PoolId, SlotId};
use crate::stats::PoolStats;
use log::{debug, error, info, trace, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Acquires are served
    Open,
    /// A shutdown has begun; acquires are refused but releases are accepted
    Closing,
    /// Every resource has been destroyed
    Shutdown,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// One position in the slot array
struct Slot<R> {
    id: SlotId,

    /// `None` once teardown has destroyed the resource
    resource: Mutex<Option<R>>,
}

/// Metadata guarded by the pool lock
struct PoolInner {
    free: FreeList,

    /// Set when a shutdown begins; no acquire succeeds afterwards
    closing: bool,

    /// Set while a shutdown call owns the sequence
    draining: bool,

    /// Set once teardown has started; the pool is inert afterwards
    shutdown: bool,

    stats: PoolStats,
}

impl PoolInner {
    fn is_closed(&self) -> bool {
        self.closing || self.shutdown
    }

    fn state(&self) -> PoolState {
        if self.shutdown {
            PoolState::Shutdown
        } else if self.closing {
            PoolState::Closing
        } else {
            PoolState::Open
        }
    }
}

pub(crate) struct Shared<F: ResourceFactory> {
    id: PoolId,
    config: PoolConfig,
    factory: F,
    slots: Box<[Slot<F::Resource>]>,
    inner: Mutex<PoolInner>,
    not_empty: Condvar,
    full: Condvar,
}

impl<F: ResourceFactory> Shared<F> {
    pub(crate) fn id(&self) -> PoolId {
        self.id
    }

    /// Run `f` against the resource in `slot`, unless teardown destroyed it.
    pub(crate) fn with_resource<T>(
        &self,
        slot: SlotId,
        f: impl FnOnce(&mut F::Resource) -> T,
    ) -> Result<T> {
        let mut resource = self.slots[slot.index()].resource.lock();
        match resource.as_mut() {
            Some(resource) => Ok(f(resource)),
            None => Err(PoolError::ResourceDestroyed(slot)),
        }
    }

    /// Put `slot` back at the tail of the free queue and wake waiters.
    pub(crate) fn give_back(&self, slot: SlotId) -> Result<()> {
        let capacity = self.slots.len();

        let available = {
            let mut inner = self.inner.lock();

            if inner.shutdown {
                warn!(
                    "Rejecting release of slot {} into pool {}: pool is shut down",
                    slot, self.id
                );
                return Err(PoolError::PoolClosed);
            }

            if let Err(slot) = inner.free.push_back(slot) {
                error!("Slot {} released into pool {} twice", slot, self.id);
                debug_assert!(false, "slot {} is already in the free queue", slot);
                return Err(PoolError::ContractViolation(format!(
                    "slot {} is already free",
                    slot
                )));
            }

            inner.stats.returns += 1;
            trace!("Returned slot {} ({} available)", slot, inner.free.len());
            inner.free.len()
        };

        if available > 0 {
            self.not_empty.notify_all();
        }
        if available == capacity {
            self.full.notify_all();
        }

        Ok(())
    }

    /// Hand every remaining resource to the factory. Each slot's resource is
    /// taken out before it is destroyed, so a slot is never destroyed twice.
    fn teardown(&self) {
        let mut destroyed = 0;
        for slot in self.slots.iter() {
            let resource = slot.resource.lock().take();
            if let Some(resource) = resource {
                self.factory.destroy(slot.id, resource);
                destroyed += 1;
            }
        }

        self.inner.lock().stats.destroyed += destroyed;
        info!("Pool {}: closed {} connections", self.id, destroyed);
    }
}

impl<F: ResourceFactory> Drop for Shared<F> {
    fn drop(&mut self) {
        // Every checkout holds a reference, so nothing is outstanding here
        let inner = self.inner.get_mut();
        if inner.shutdown {
            return;
        }
        inner.closing = true;
        inner.shutdown = true;

        debug!("Pool {} dropped without shutdown, tearing down", self.id);
        self.teardown();
    }
}

/// A bounded pool of pre-created resources shared by many threads.
///
/// The handle is cheap to clone; clones refer to the same pool.
///
/// # Examples
///
/// ```
/// use cpool_core::{from_fn, ConnectionPool, PoolConfig};
///
/// let factory = from_fn(
///     |slot| Ok::<_, std::io::Error>(format!("conn-{}", slot.index())),
///     |_slot, _conn| {},
/// );
/// let pool = ConnectionPool::new(PoolConfig::with_capacity(2), factory).unwrap();
///
/// let conn = pool.acquire().unwrap();
/// assert_eq!(conn.with(|c| c.clone()).unwrap(), "conn-0");
/// assert_eq!(pool.available(), 1);
///
/// pool.release(conn).unwrap();
/// pool.shutdown(true).unwrap();
/// assert!(pool.acquire().is_err());
/// ```
pub struct ConnectionPool<F: ResourceFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: ResourceFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: ResourceFactory> ConnectionPool<F> {
    /// Build a pool, creating `config.capacity` resources up front.
    ///
    /// If the factory fails for any slot, the resources already created are
    /// destroyed before the error is returned.
    pub fn new(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity;
        let id = PoolId::new();

        info!("Initializing pool {} with {} connections", id, capacity);

        let mut resources = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let slot = SlotId::new(index);
            match factory.create(slot) {
                Ok(resource) => resources.push(resource),
                Err(e) => {
                    error!("Failed to create connection for slot {}: {}", slot, e);
                    for (index, resource) in resources.into_iter().enumerate() {
                        factory.destroy(SlotId::new(index), resource);
                    }
                    return Err(PoolError::ConstructionFailed {
                        slot,
                        source: Box::new(e),
                    });
                }
            }
        }

        let slots = resources
            .into_iter()
            .enumerate()
            .map(|(index, resource)| Slot {
                id: SlotId::new(index),
                resource: Mutex::new(Some(resource)),
            })
            .collect();

        let inner = PoolInner {
            free: FreeList::filled(capacity),
            closing: false,
            draining: false,
            shutdown: false,
            stats: PoolStats {
                created: capacity,
                ..PoolStats::default()
            },
        };

        debug!("Pool {} initialized", id);

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                config,
                factory,
                slots,
                inner: Mutex::new(inner),
                not_empty: Condvar::new(),
                full: Condvar::new(),
            }),
        })
    }

    /// Take a resource, waiting up to the configured acquire deadline
    /// (forever if none is configured).
    pub fn acquire(&self) -> Result<Checkout<F>> {
        self.checkout(self.shared.config.acquire_deadline())
    }

    /// Take a resource, waiting at most `timeout` for one to be released.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Checkout<F>> {
        self.checkout(Some(timeout))
    }

    /// Take a resource only if one is free right now.
    pub fn try_acquire(&self) -> Result<Checkout<F>> {
        let mut inner = self.shared.inner.lock();

        if inner.is_closed() {
            inner.stats.rejected += 1;
            return Err(PoolError::PoolClosed);
        }

        match inner.free.pop_front() {
            Some(slot) => {
                inner.stats.checkouts += 1;
                Ok(Checkout::new(Arc::clone(&self.shared), slot))
            }
            None => Err(PoolError::Exhausted),
        }
    }

    fn checkout(&self, timeout: Option<Duration>) -> Result<Checkout<F>> {
        let started = Instant::now();
        // A deadline past the end of the clock means wait forever
        let deadline = timeout.and_then(|timeout| started.checked_add(timeout));
        let mut waited = false;

        let mut inner = self.shared.inner.lock();
        loop {
            if inner.is_closed() {
                if waited {
                    inner.stats.record_wait(started.elapsed());
                }
                inner.stats.rejected += 1;
                warn!("Pool {} is shut down, refusing acquire", self.shared.id);
                return Err(PoolError::PoolClosed);
            }

            if let Some(slot) = inner.free.pop_front() {
                if waited {
                    inner.stats.record_wait(started.elapsed());
                }
                inner.stats.checkouts += 1;
                trace!("Checked out slot {} ({} available)", slot, inner.free.len());
                return Ok(Checkout::new(Arc::clone(&self.shared), slot));
            }

            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                if Instant::now() >= deadline {
                    if waited {
                        inner.stats.record_wait(started.elapsed());
                    }
                    inner.stats.timeouts += 1;
                    return Err(PoolError::Timeout(timeout));
                }
            }

            if !waited {
                debug!("Pool {} exhausted, waiting for a release", self.shared.id);
                waited = true;
            }

            match deadline {
                Some(deadline) => {
                    self.shared.not_empty.wait_until(&mut inner, deadline);
                }
                None => self.shared.not_empty.wait(&mut inner),
            }
        }
    }

    /// Return a checked-out resource to the free queue.
    ///
    /// Fails with [`PoolError::ContractViolation`] for a checkout taken from a
    /// different pool (which is then returned to its own pool), and with
    /// [`PoolError::PoolClosed`] once teardown has begun.
    ///
    /// # Panics
    ///
    /// Releasing into a different pool panics in debug builds.
    pub fn release(&self, checkout: Checkout<F>) -> Result<()> {
        if checkout.pool_id() != self.shared.id {
            error!(
                "Slot {} of pool {} released into pool {}",
                checkout.id(),
                checkout.pool_id(),
                self.shared.id
            );
            debug_assert!(
                false,
                "slot {} of pool {} released into pool {}",
                checkout.id(),
                checkout.pool_id(),
                self.shared.id
            );
            return Err(PoolError::ContractViolation(format!(
                "slot {} belongs to pool {}",
                checkout.id(),
                checkout.pool_id()
            )));
        }
        checkout.release()
    }

    /// Shut the pool down.
    ///
    /// With `drain`, waits (up to the configured drain deadline) until every
    /// checkout has been released. Without it, resources still checked out
    /// are destroyed underneath their holders, whose later accesses fail
    /// with [`PoolError::ResourceDestroyed`]. A holder that is inside
    /// [`Checkout::with`] at that moment finishes its call first.
    ///
    /// A call made while another shutdown is in progress, or after one has
    /// completed, returns `Ok(())` without doing anything.
    pub fn shutdown(&self, drain: bool) -> Result<()> {
        self.close(drain, self.shared.config.drain_deadline())
    }

    /// Drain and shut the pool down, waiting at most `timeout` for
    /// outstanding checkouts.
    ///
    /// On timeout the pool stays closed to new acquires and a later
    /// shutdown call may try again.
    pub fn shutdown_timeout(&self, timeout: Duration) -> Result<()> {
        self.close(true, Some(timeout))
    }

    fn close(&self, drain: bool, timeout: Option<Duration>) -> Result<()> {
        let capacity = self.shared.slots.len();
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        {
            let mut inner = self.shared.inner.lock();

            if inner.shutdown || inner.draining {
                debug!("Pool {} shutdown already in progress", self.shared.id);
                return Ok(());
            }

            info!(
                "Shutting down pool {} (drain: {}, {} of {} available)",
                self.shared.id,
                drain,
                inner.free.len(),
                capacity
            );
            inner.closing = true;
            inner.draining = true;
            self.shared.not_empty.notify_all();

            if drain {
                while inner.free.len() != capacity {
                    debug!(
                        "Pool {} draining, {} connections outstanding",
                        self.shared.id,
                        capacity - inner.free.len()
                    );
                    match (deadline, timeout) {
                        (Some(deadline), Some(timeout)) => {
                            if Instant::now() >= deadline {
                                inner.draining = false;
                                inner.stats.timeouts += 1;
                                warn!(
                                    "Pool {} drain timed out with {} connections outstanding",
                                    self.shared.id,
                                    capacity - inner.free.len()
                                );
                                return Err(PoolError::Timeout(timeout));
                            }
                            self.shared.full.wait_until(&mut inner, deadline);
                        }
                        _ => self.shared.full.wait(&mut inner),
                    }
                }
            } else if inner.free.len() != capacity {
                warn!(
                    "Pool {} shutting down with {} connections still checked out",
                    self.shared.id,
                    capacity - inner.free.len()
                );
            }

            inner.shutdown = true;
            inner.draining = false;
        }

        self.shared.not_empty.notify_all();
        self.shared.teardown();

        Ok(())
    }

    /// Identity of this pool.
    pub fn id(&self) -> PoolId {
        self.shared.id
    }

    /// Configuration the pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Number of slots; fixed for the pool's lifetime.
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Number of resources currently in the free queue.
    pub fn available(&self) -> usize {
        self.shared.inner.lock().free.len()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.shared.inner.lock().state()
    }

    /// Whether acquires are being refused.
    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().is_closed()
    }

    /// Snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        self.shared.inner.lock().stats.clone()
    }

    /// Slots in the free queue, head first.
    pub fn free_slots(&self) -> Vec<SlotId> {
        self.shared.inner.lock().free.iter().collect()
    }
}

impl<F: ResourceFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ConnectionPool")
            .field("id", &self.shared.id)
            .field("capacity", &self.shared.slots.len())
            .field("available", &inner.free.len())
            .field("state", &inner.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::from_fn;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting_pool(
        capacity: usize,
    ) -> (
        ConnectionPool<impl ResourceFactory<Resource = usize>>,
        Arc<AtomicUsize>,
    ) {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let factory = from_fn(
            |slot: SlotId| Ok::<_, io::Error>(slot.index()),
            move |_slot, _value| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        let pool = ConnectionPool::new(PoolConfig::with_capacity(capacity), factory).unwrap();
        (pool, destroyed)
    }

    #[test]
    fn test_acquire_release_round_trip() {
        let (pool, _) = counting_pool(3);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.state(), PoolState::Open);

        let conn = pool.acquire().unwrap();
        let id = conn.id();
        assert_eq!(id, SlotId::new(0));
        assert_eq!(pool.available(), 2);

        pool.release(conn).unwrap();
        assert_eq!(pool.available(), 3);
        // Returned slot goes to the tail of the queue
        assert_eq!(pool.free_slots().last(), Some(&id));
    }

    #[test]
    fn test_try_acquire_exhausted() {
        let (pool, _) = counting_pool(1);
        let held = pool.try_acquire().unwrap();
        assert!(matches!(pool.try_acquire(), Err(PoolError::Exhausted)));
        drop(held);
        assert!(pool.try_acquire().is_ok());
    }

    #[test]
    fn test_acquire_timeout_expires() {
        let (pool, _) = counting_pool(1);
        let _held = pool.acquire().unwrap();

        let started = Instant::now();
        let result = pool.acquire_timeout(Duration::from_millis(30));
        assert!(matches!(result, Err(PoolError::Timeout(_))));
        assert!(started.elapsed() >= Duration::from_millis(30));

        let stats = pool.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.waits, 1);
    }

    #[test]
    fn test_configured_acquire_timeout_is_default() {
        let factory = from_fn(|_slot| Ok::<_, io::Error>(()), |_slot, _conn| {});
        let config = PoolConfig::with_capacity(1).acquire_timeout(Duration::from_millis(10));
        let pool = ConnectionPool::new(config, factory).unwrap();

        let _held = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(PoolError::Timeout(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let factory = from_fn(|_slot| Ok::<_, io::Error>(()), |_slot, _conn| {});
        let result = ConnectionPool::new(PoolConfig::with_capacity(0), factory);
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "released into pool"))]
    fn test_release_into_foreign_pool() {
        let (pool_a, _) = counting_pool(1);
        let (pool_b, _) = counting_pool(1);

        let conn = pool_a.acquire().unwrap();
        let result = pool_b.release(conn);
        assert!(matches!(result, Err(PoolError::ContractViolation(_))));

        // The checkout found its way home when it was dropped
        assert_eq!(pool_a.available(), 1);
        assert_eq!(pool_b.available(), 1);
    }

    #[test]
    fn test_foreign_release_returns_checkout_home_after_panic() {
        let (pool_a, _) = counting_pool(1);
        let (pool_b, _) = counting_pool(1);

        let conn = pool_a.acquire().unwrap();
        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pool_b.release(conn)));
        if let Ok(result) = result {
            assert!(matches!(result, Err(PoolError::ContractViolation(_))));
        }

        assert_eq!(pool_a.available(), 1);
        assert_eq!(pool_b.available(), 1);
    }

    #[test]
    fn test_unbounded_acquire_timeout() {
        let (pool, _) = counting_pool(1);

        let conn = pool.acquire_timeout(Duration::MAX).unwrap();
        assert_eq!(conn.id(), SlotId::new(0));

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire_timeout(Duration::MAX).map(|c| c.id()))
        };
        thread::sleep(Duration::from_millis(30));
        pool.release(conn).unwrap();

        assert_eq!(waiter.join().unwrap().unwrap(), SlotId::new(0));
        assert_eq!(pool.stats().timeouts, 0);
    }

    #[test]
    fn test_unbounded_shutdown_timeout() {
        let (pool, destroyed) = counting_pool(2);
        let held = pool.acquire().unwrap();

        let drainer = {
            let pool = pool.clone();
            thread::spawn(move || pool.shutdown_timeout(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(30));
        assert_eq!(pool.state(), PoolState::Closing);

        // A second call while the first is draining is a no-op
        pool.shutdown_timeout(Duration::MAX).unwrap();

        pool.release(held).unwrap();
        drainer.join().unwrap().unwrap();
        assert_eq!(pool.state(), PoolState::Shutdown);
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_timeout_on_empty_pool_does_not_count_a_wait() {
        let (pool, _) = counting_pool(1);
        let _held = pool.acquire().unwrap();

        let result = pool.acquire_timeout(Duration::ZERO);
        assert!(matches!(result, Err(PoolError::Timeout(_))));

        let stats = pool.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.waits, 0);
        assert_eq!(stats.max_wait_us, 0);
    }

    #[test]
    fn test_second_shutdown_is_noop() {
        let (pool, destroyed) = counting_pool(2);
        pool.shutdown(true).unwrap();
        pool.shutdown(true).unwrap();
        pool.shutdown(false).unwrap();

        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.state(), PoolState::Shutdown);
        assert_eq!(pool.stats().destroyed, 2);
    }

    #[test]
    fn test_drop_without_shutdown_tears_down() {
        let (pool, destroyed) = counting_pool(4);
        let clone = pool.clone();
        drop(pool);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);

        drop(clone);
        assert_eq!(destroyed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_drain_timeout_leaves_pool_closed() {
        let (pool, destroyed) = counting_pool(2);
        let held = pool.acquire().unwrap();

        let result = pool.shutdown_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(PoolError::Timeout(_))));
        assert_eq!(pool.state(), PoolState::Closing);
        assert!(matches!(pool.acquire(), Err(PoolError::PoolClosed)));
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);

        // Releases are still accepted while closing, and a retry completes
        pool.release(held).unwrap();
        pool.shutdown(true).unwrap();
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_closing_wakes_blocked_acquirers() {
        let (pool, _) = counting_pool(1);
        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|c| c.id()))
        };
        thread::sleep(Duration::from_millis(50));

        let drainer = {
            let pool = pool.clone();
            thread::spawn(move || pool.shutdown(true))
        };

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(PoolError::PoolClosed)));

        pool.release(held).unwrap();
        drainer.join().unwrap().unwrap();
        assert_eq!(pool.state(), PoolState::Shutdown);
    }
}
