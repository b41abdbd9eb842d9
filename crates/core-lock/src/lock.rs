//! ResourceLock: shared/exclusive admission with strict FIFO fairness
//!
//! # Admission rule
//!
//! A request is admitted iff there is no exclusive holder and either the request
//! is shared, or it is exclusive and nobody holds the lock. A new request is only
//! admitted on arrival when the wait queue is empty; otherwise it queues behind
//! the earlier requests.
//!
//! # Fairness
//!
//! On every release the queue is scanned from the front, granting requests while
//! they can be admitted and stopping at the first one that cannot. A shared
//! request therefore never overtakes an exclusive request that arrived before it.

use crate::dispatch::{GrantDispatcher, Handoff};
use crate::error::LockError;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

/// Kind of access requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    /// Any number of shared holders may coexist
    Shared,
    /// Single holder, excludes every other holder
    Exclusive,
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::Shared => write!(f, "shared"),
            LockType::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// A queued request
enum Waiter {
    /// A thread parked in `lock_blocking`, identified by its ticket
    Blocking { ticket: u64, lock_type: LockType },
    /// A non-blocking request completed through the dispatcher
    Async {
        lock_type: LockType,
        reply: oneshot::Sender<Grant>,
    },
}

impl Waiter {
    fn lock_type(&self) -> LockType {
        match self {
            Waiter::Blocking { lock_type, .. } | Waiter::Async { lock_type, .. } => *lock_type,
        }
    }

    /// A non-blocking requester that dropped its receiver no longer needs a grant
    fn is_abandoned(&self) -> bool {
        match self {
            Waiter::Blocking { .. } => false,
            Waiter::Async { reply, .. } => reply.is_closed(),
        }
    }
}

struct LockState {
    holders: usize,
    exclusive: bool,
    queue: VecDeque<Waiter>,
    /// Tickets of blocking waiters that were granted but have not woken yet
    granted_tickets: HashSet<u64>,
    next_ticket: u64,
}

impl LockState {
    fn new() -> Self {
        Self {
            holders: 0,
            exclusive: false,
            queue: VecDeque::new(),
            granted_tickets: HashSet::new(),
            next_ticket: 0,
        }
    }

    fn try_acquire(&mut self, lock_type: LockType) -> bool {
        if self.exclusive {
            return false;
        }
        if lock_type == LockType::Exclusive && self.holders > 0 {
            return false;
        }
        self.holders += 1;
        self.exclusive = lock_type == LockType::Exclusive;
        true
    }

    /// Admission for a request that just arrived
    fn try_admit_arrival(&mut self, lock_type: LockType) -> bool {
        self.queue.is_empty() && self.try_acquire(lock_type)
    }
}

pub(crate) struct LockInner {
    label: String,
    state: Mutex<LockState>,
    wakeup: Condvar,
    dispatcher: GrantDispatcher,
}

impl LockInner {
    /// Give back one holder slot and grant whatever the queue head allows.
    fn release(self: &Arc<Self>, lock_type: LockType) {
        let (handoffs, woke_blocking) = {
            let mut state = self.state.lock();

            if state.holders == 0 {
                error!(
                    lock = %self.label,
                    lock_type = %lock_type,
                    "Unlock without a matching lock, holder count stays at zero"
                );
            } else {
                state.holders -= 1;
                if state.holders == 0 {
                    state.exclusive = false;
                }
            }

            self.grant_queued(&mut state)
        };

        if woke_blocking {
            self.wakeup.notify_all();
        }

        // Delivered outside of the critical section.
        for handoff in handoffs {
            self.dispatcher.dispatch(handoff);
        }
    }

    /// Scan the queue from the front and admit requests until one does not fit.
    ///
    /// Returned grants must not be dropped while `state` is held.
    fn grant_queued(self: &Arc<Self>, state: &mut LockState) -> (Vec<Handoff>, bool) {
        let mut handoffs = Vec::new();
        let mut woke_blocking = false;

        loop {
            let Some(front) = state.queue.front() else {
                break;
            };

            if front.is_abandoned() {
                state.queue.pop_front();
                continue;
            }

            let lock_type = front.lock_type();
            if !state.try_acquire(lock_type) {
                break;
            }

            match state.queue.pop_front() {
                Some(Waiter::Blocking { ticket, .. }) => {
                    state.granted_tickets.insert(ticket);
                    woke_blocking = true;
                }
                Some(Waiter::Async { lock_type, reply }) => {
                    handoffs.push(Handoff {
                        reply,
                        grant: Grant::new(self.clone(), lock_type),
                    });
                }
                None => break,
            }
        }

        (handoffs, woke_blocking)
    }
}

/// Shared/exclusive lock guarding one node.
///
/// Cloning yields another handle to the same lock.
#[derive(Clone)]
pub struct ResourceLock {
    inner: Arc<LockInner>,
}

impl ResourceLock {
    /// Create a lock that delivers queued grants through the global dispatcher
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_dispatcher(label, GrantDispatcher::global())
    }

    /// Create a lock with an explicit dispatcher
    pub fn with_dispatcher(label: impl Into<String>, dispatcher: GrantDispatcher) -> Self {
        Self {
            inner: Arc::new(LockInner {
                label: label.into(),
                state: Mutex::new(LockState::new()),
                wakeup: Condvar::new(),
                dispatcher,
            }),
        }
    }

    /// Label used in log output (the node id)
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Non-blocking acquisition.
    ///
    /// Returns at once, either with a grant or with a pending request that
    /// completes once every earlier request has been served.
    pub fn lock(&self, lock_type: LockType) -> LockRequest {
        let mut state = self.inner.state.lock();

        if state.try_admit_arrival(lock_type) {
            drop(state);
            trace!(lock = %self.inner.label, lock_type = %lock_type, "Lock granted immediately");
            return LockRequest::Granted(Grant::new(self.inner.clone(), lock_type));
        }

        let (reply, receiver) = oneshot::channel();
        state.queue.push_back(Waiter::Async { lock_type, reply });
        debug!(
            lock = %self.inner.label,
            lock_type = %lock_type,
            queued = state.queue.len(),
            "Lock request queued"
        );

        LockRequest::Pending {
            label: self.inner.label.clone(),
            receiver,
        }
    }

    /// Non-blocking acquisition, awaited to completion
    pub async fn acquire(&self, lock_type: LockType) -> Result<Grant, LockError> {
        self.lock(lock_type).wait().await
    }

    /// Blocking acquisition: parks the calling thread until granted.
    ///
    /// Do not call this from an async task; use [`ResourceLock::acquire`] or
    /// move the call onto a blocking thread.
    pub fn lock_blocking(&self, lock_type: LockType) -> Grant {
        let mut state = self.inner.state.lock();

        if !state.try_admit_arrival(lock_type) {
            let ticket = state.next_ticket;
            state.next_ticket = state.next_ticket.wrapping_add(1);
            state.queue.push_back(Waiter::Blocking { ticket, lock_type });
            debug!(
                lock = %self.inner.label,
                lock_type = %lock_type,
                ticket,
                "Blocking lock request queued"
            );

            while !state.granted_tickets.remove(&ticket) {
                self.inner.wakeup.wait(&mut state);
            }
        }

        drop(state);
        Grant::new(self.inner.clone(), lock_type)
    }

    /// Acquire only if it can be granted right now; never queues
    pub fn try_lock(&self, lock_type: LockType) -> Option<Grant> {
        let mut state = self.inner.state.lock();
        if state.try_admit_arrival(lock_type) {
            drop(state);
            Some(Grant::new(self.inner.clone(), lock_type))
        } else {
            None
        }
    }

    /// Number of current holders
    pub fn holder_count(&self) -> usize {
        self.inner.state.lock().holders
    }

    /// Whether the current holder set is a single exclusive holder
    pub fn is_exclusive(&self) -> bool {
        self.inner.state.lock().exclusive
    }

    /// Number of queued requests
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    #[cfg(test)]
    pub(crate) fn force_release(&self, lock_type: LockType) {
        self.inner.release(lock_type);
    }
}

impl fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ResourceLock")
            .field("label", &self.inner.label)
            .field("holders", &state.holders)
            .field("exclusive", &state.exclusive)
            .field("queued", &state.queue.len())
            .finish()
    }
}

/// Outcome of a non-blocking acquisition
pub enum LockRequest {
    /// Admitted on arrival
    Granted(Grant),
    /// Queued; completes when the dispatcher delivers the grant
    Pending {
        label: String,
        receiver: oneshot::Receiver<Grant>,
    },
}

impl LockRequest {
    /// Whether the request was admitted on arrival
    pub fn is_granted(&self) -> bool {
        matches!(self, LockRequest::Granted(_))
    }

    /// Wait for the grant
    pub async fn wait(self) -> Result<Grant, LockError> {
        match self {
            LockRequest::Granted(grant) => Ok(grant),
            LockRequest::Pending { label, receiver } => {
                receiver.await.map_err(|_| LockError::Abandoned(label))
            }
        }
    }
}

impl fmt::Debug for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockRequest::Granted(grant) => f.debug_tuple("Granted").field(grant).finish(),
            LockRequest::Pending { label, .. } => {
                f.debug_struct("Pending").field("label", label).finish()
            }
        }
    }
}

/// Proof of a successful acquisition.
///
/// Released exactly once: by [`Grant::unlock`] or, failing that, on drop.
/// Further unlock calls are ignored.
pub struct Grant {
    lock: Arc<LockInner>,
    lock_type: LockType,
    released: AtomicBool,
}

impl Grant {
    fn new(lock: Arc<LockInner>, lock_type: LockType) -> Self {
        Self {
            lock,
            lock_type,
            released: AtomicBool::new(false),
        }
    }

    /// Kind of access this grant holds
    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    /// Label of the lock this grant belongs to
    pub fn label(&self) -> &str {
        &self.lock.label
    }

    /// Whether the grant has already been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Release the grant. A second call is a no-op.
    pub fn unlock(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            debug!(
                lock = %self.lock.label,
                lock_type = %self.lock_type,
                "Grant already released, ignoring unlock"
            );
            return;
        }
        trace!(lock = %self.lock.label, lock_type = %self.lock_type, "Unlock");
        self.lock.release(self.lock_type);
    }
}

impl Drop for Grant {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.lock.release(self.lock_type);
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grant")
            .field("lock", &self.lock.label)
            .field("lock_type", &self.lock_type)
            .field("released", &self.is_released())
            .finish()
    }
}
