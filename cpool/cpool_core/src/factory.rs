//! The factory collaborator that opens and closes pooled resources.
//!
//! The pool never looks inside a resource. It calls [`ResourceFactory::create`]
//! exactly once per slot while the pool is built and
//! [`ResourceFactory::destroy`] exactly once per slot during teardown.

use crate::id::SlotId;

/// Creates and destroys the resources held by a pool.
pub trait ResourceFactory: Send + Sync + 'static {
    /// The pooled resource, e.g. a database connection
    type Resource: Send + 'static;

    /// Error reported when a resource cannot be created
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create the resource for `slot`.
    fn create(&self, slot: SlotId) -> Result<Self::Resource, Self::Error>;

    /// Release the resource for `slot`. Called for every slot, including
    /// ones that were never checked out.
    fn destroy(&self, slot: SlotId, resource: Self::Resource);
}

/// A factory assembled from two closures.
///
/// # Examples
///
/// ```
/// use cpool_core::factory::{from_fn, ResourceFactory};
/// use cpool_core::id::SlotId;
///
/// let factory = from_fn(
///     |slot: SlotId| Ok::<_, std::io::Error>(slot.index() * 10),
///     |_slot, _value| {},
/// );
/// assert_eq!(factory.create(SlotId::new(2)).unwrap(), 20);
/// ```
pub struct FnFactory<C, D> {
    create: C,
    destroy: D,
}

/// Build a [`ResourceFactory`] from a create closure and a destroy closure.
pub fn from_fn<R, E, C, D>(create: C, destroy: D) -> FnFactory<C, D>
where
    R: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    C: Fn(SlotId) -> Result<R, E> + Send + Sync + 'static,
    D: Fn(SlotId, R) + Send + Sync + 'static,
{
    FnFactory { create, destroy }
}

impl<R, E, C, D> ResourceFactory for FnFactory<C, D>
where
    R: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    C: Fn(SlotId) -> Result<R, E> + Send + Sync + 'static,
    D: Fn(SlotId, R) + Send + Sync + 'static,
{
    type Resource = R;
    type Error = E;

    fn create(&self, slot: SlotId) -> Result<R, E> {
        (self.create)(slot)
    }

    fn destroy(&self, slot: SlotId, resource: R) {
        (self.destroy)(slot, resource)
    }
}
