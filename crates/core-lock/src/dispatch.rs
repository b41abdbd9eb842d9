//! Grant dispatcher: completes queued non-blocking lock requests
//!
//! When a release makes room for queued non-blocking requests, the releasing
//! thread must not complete those requests itself while it still holds the
//! lock's critical section. Instead it hands each `(reply, grant)` pair to a
//! dispatcher, which delivers them from a separate worker.

use crate::lock::Grant;
use std::sync::OnceLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

/// A granted request waiting to be delivered to its requester
pub(crate) struct Handoff {
    pub(crate) reply: oneshot::Sender<Grant>,
    pub(crate) grant: Grant,
}

impl Handoff {
    /// Complete the request. If the requester has gone away, the returned
    /// grant is dropped here, which releases it again.
    pub(crate) fn deliver(self) {
        if let Err(grant) = self.reply.send(self.grant) {
            trace!(
                lock = %grant.label(),
                lock_type = %grant.lock_type(),
                "requester went away before delivery, releasing grant"
            );
            drop(grant);
        }
    }
}

/// Delivers queued grants outside of the lock's critical section.
///
/// Cheap to clone; all clones feed the same worker.
#[derive(Clone, Debug)]
pub struct GrantDispatcher {
    tx: Option<mpsc::UnboundedSender<Handoff>>,
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff").field("grant", &self.grant).finish()
    }
}

impl GrantDispatcher {
    /// The process-wide dispatcher, backed by one dedicated thread.
    ///
    /// Started on first use. Does not require a Tokio runtime.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<GrantDispatcher> = OnceLock::new();
        GLOBAL.get_or_init(Self::spawn_thread).clone()
    }

    /// Start a dispatcher on a dedicated OS thread.
    ///
    /// Falls back to [`GrantDispatcher::inline`] if the thread cannot be spawned.
    pub fn spawn_thread() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Handoff>();

        let spawned = std::thread::Builder::new()
            .name("lock-grant-dispatcher".to_string())
            .spawn(move || {
                while let Some(handoff) = rx.blocking_recv() {
                    handoff.deliver();
                }
            });

        match spawned {
            Ok(_) => Self { tx: Some(tx) },
            Err(e) => {
                warn!(
                    "Failed to start lock grant dispatcher thread ({}), delivering grants inline",
                    e
                );
                Self::inline()
            }
        }
    }

    /// Start a dispatcher as a task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn_task() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Handoff>();

        tokio::spawn(async move {
            while let Some(handoff) = rx.recv().await {
                handoff.deliver();
            }
        });

        Self { tx: Some(tx) }
    }

    /// A dispatcher without a worker: the releasing thread delivers grants
    /// itself, after it has left the lock's critical section.
    pub fn inline() -> Self {
        Self { tx: None }
    }

    /// Queue a handoff for delivery.
    ///
    /// Must be called with the lock's state mutex released.
    pub(crate) fn dispatch(&self, handoff: Handoff) {
        match &self.tx {
            Some(tx) => {
                if let Err(mpsc::error::SendError(handoff)) = tx.send(handoff) {
                    // Worker is gone (runtime shut down); deliver from here.
                    handoff.deliver();
                }
            }
            None => handoff.deliver(),
        }
    }
}
