//! A1PMS Sentinel: keeps managed nodes consistent with the registry
//!
//! The Sentinel owns every background activity of the control plane. It
//! decides when a node has drifted from the locally desired state, repairs
//! it, and expires services that stopped sending heartbeats.
//!
//! # Node lifecycle
//!
//! ```text
//!   UNAVAILABLE ──(reachable)──────────> SYNCHRONIZING ──(success)──> AVAILABLE
//!        ^                                 │      ^                      │
//!        └───────────(failure)─────────────┘      │                 next tick
//!        ^                                        │                      v
//!        └──(unreachable)── CONSISTENCY_CHECK ──(drift)     CONSISTENCY_CHECK
//!                                  ^                                     │
//!                                  └────────────(consistent: back to AVAILABLE)
//! ```
//!
//! Only the supervisors write node state. Request handlers read it to accept
//! or reject mutations.
//!
//! # Example
//!
//! ```no_run
//! use a1pms_connect::{A1ClientFactory, HttpServiceNotifier};
//! use a1pms_core_registry::{A1Dialect, MemoryStore, Nodes, Policies, PolicyTypes, Services};
//! use a1pms_sentinel::{Supervisor, SupervisionContext, SupervisionPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let http = reqwest::Client::new();
//! let ctx = SupervisionContext {
//!     nodes: Arc::new(Nodes::new()),
//!     policies: Arc::new(Policies::new(store.clone())),
//!     policy_types: Arc::new(PolicyTypes::new(store.clone())),
//!     services: Arc::new(Services::new(store)),
//!     clients: Arc::new(A1ClientFactory::new(http.clone(), A1Dialect::ALL.to_vec())),
//!     notifier: Arc::new(HttpServiceNotifier::new(http)),
//! };
//!
//! let handle = Supervisor::spawn(ctx, SupervisionPolicy::default())?;
//! tokio::time::sleep(Duration::from_secs(60)).await;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod daemon;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod service_sweep;
pub mod supervision;
pub mod synchronizer;

pub use context::SupervisionContext;
pub use daemon::{Supervisor, SupervisorHandle};
pub use error::{SentinelError, SyncError};
pub use metrics::{ServiceSweepStats, SupervisionStats};
pub use policy::SupervisionPolicy;
pub use service_sweep::{CascadeOutcome, ServiceSupervision};
pub use supervision::{NodeCheck, NodeSupervision};
pub use synchronizer::NodeSynchronizer;
