//! A1PMS Core Lock: per-node mutual exclusion
//!
//! # Overview
//!
//! Every managed node owns one [`ResourceLock`]. User-facing policy mutations take
//! it in [`LockType::Shared`] mode, so requests against the same node may run side
//! by side. Supervision and synchronization take it in [`LockType::Exclusive`]
//! mode, so no mutation ever overlaps a repair.
//!
//! The lock offers two calling conventions over one admission state machine:
//!
//! - **Blocking**: [`ResourceLock::lock_blocking`] parks the calling thread on a
//!   condition variable until the request is granted.
//! - **Non-blocking**: [`ResourceLock::lock`] returns immediately with a
//!   [`LockRequest`] that is either already granted or completes later.
//!
//! ```text
//!   lock(type) ──┐                        ┌── Grant (immediate)
//!                ├──> [ admission state ] ─┤
//!   lock_blocking┘    holders / exclusive  └── FIFO queue ──┐
//!                                                          │ on release
//!                        blocking waiter <── condvar ──────┤
//!                        async waiter    <── dispatcher <──┘
//! ```
//!
//! Queued non-blocking grants are never completed from inside the lock's own
//! critical section. They are handed to a [`GrantDispatcher`] which completes
//! them from its own thread (or task).
//!
//! # Example
//!
//! ```
//! use a1pms_core_lock::{LockType, ResourceLock};
//!
//! # async fn example() -> Result<(), a1pms_core_lock::LockError> {
//! let lock = ResourceLock::new("ric1");
//!
//! let grant = lock.acquire(LockType::Shared).await?;
//! assert_eq!(lock.holder_count(), 1);
//!
//! grant.unlock();
//! assert_eq!(lock.holder_count(), 0);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod lock;

pub use dispatch::GrantDispatcher;
pub use error::LockError;
pub use lock::{Grant, LockRequest, LockType, ResourceLock};
