#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # cpool core
//!
//! A bounded pool of pre-established, expensive-to-create resources such as
//! database connections, shared by many threads.
//!
//! The pool creates every resource up front through a [`ResourceFactory`],
//! lends them out in FIFO order and takes them back, and shuts down
//! cooperatively: new acquires are refused first, outstanding checkouts can
//! be drained, and only then is each resource destroyed, exactly once.
//!
//! ## Crate Structure
//!
//! - **pool**: the pool, its free queue and checkout handles
//! - **factory**: the collaborator that opens and closes resources
//! - **config**: pool sizing, deadlines and connection parameters
//! - **error**: the error taxonomy for pool operations
//! - **stats**: usage counters
//! - **id**: pool and slot identifiers

pub mod config;
pub mod error;
pub mod factory;
pub mod id;
pub mod pool;
pub mod stats;

// Re-export key types for easier access
pub use config::{ConnectionParams, PoolConfig};
pub use error::{FactoryError, PoolError, Result};
pub use factory::{from_fn, FnFactory, ResourceFactory};
pub use id::{PoolId, SlotId};
pub use pool::{Checkout, ConnectionPool, PoolState};
pub use stats::PoolStats;
