//! A1PMS Core Registry: the locally desired state
//!
//! Four registries hold the control plane's view of the world:
//!
//! - [`Nodes`]: managed Near-RT RICs, each with its availability state,
//!   supported policy types and [`ResourceLock`](a1pms_core_lock::ResourceLock)
//! - [`PolicyTypes`]: schemas, keyed by type id, filterable by name and version
//! - [`Policies`]: policy instances, indexed by node, owning service and type
//! - [`Services`]: registered clients with keep-alive supervision
//!
//! Each registry guards its maps with one short critical section. No I/O runs
//! inside it; durable writes to the [`DataStore`] happen afterwards and are
//! best-effort (failures are logged, never returned).

pub mod error;
pub mod node;
pub mod policy;
pub mod policy_type;
pub mod service;
pub mod storage;

pub use error::{EntityKind, RegistryError, RegistryResult, RejectStatus};
pub use node::{A1Dialect, Node, NodeConfig, NodeState, Nodes};
pub use policy::{Policies, Policy, PolicyRecord};
pub use policy_type::{PolicyType, PolicyTypes, TypeVersion};
pub use service::{Service, ServiceRecord, Services};
pub use storage::{DataStore, FileStore, MemoryStore, StorageError};
