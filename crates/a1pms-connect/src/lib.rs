//! A1PMS Connect: southbound connectivity to Near-RT RICs
//!
//! This crate defines how the control plane talks to the nodes it manages and
//! to the services that registered with it.
//!
//! # Architecture
//!
//! - **A1Client**: remote policy operations against one node
//! - **ClientProvider**: hands out the client for a node; may detect its dialect
//! - **A1ClientFactory**: plugin table of adapters plus dialect probing
//! - **HttpA1Client**: the built-in `STD_V2` and `OSC_V1` HTTP adapters
//! - **ServiceNotifier**: best-effort callbacks to registered services
//!
//! # Example
//!
//! ```rust,no_run
//! use a1pms_connect::{A1ClientFactory, ClientProvider};
//! use a1pms_core_registry::{A1Dialect, Node, NodeConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn example() -> Result<(), a1pms_connect::A1Error> {
//!     let factory = A1ClientFactory::with_timeout(Duration::from_secs(30), A1Dialect::ALL.to_vec())?;
//!     let node = Arc::new(Node::new(NodeConfig::new("ric1", "http://ric1:8085")));
//!
//!     // Probes the node's dialect on first use, then caches it on the node
//!     let client = factory.client_for(&node).await?;
//!     let types = client.get_policy_type_identities().await?;
//!     println!("ric1 supports {:?}", types);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod factory;
pub mod http;
pub mod notifier;
pub mod testing;

pub use client::{A1Client, ClientProvider};
pub use error::{A1Error, A1Result};
pub use factory::{A1ClientFactory, AdapterFactory};
pub use http::HttpA1Client;
pub use notifier::{HttpServiceNotifier, ServiceCallbackInfo, ServiceNotifier};
