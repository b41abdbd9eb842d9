/*!
 * A1PMS - A1 Policy Management Service
 *
 * Keeps the policies and policy types of a fleet of near-RT RICs consistent
 * with a local registry:
 * - per-node SHARED/EXCLUSIVE locking between requests and repairs
 * - periodic consistency checks with automatic resynchronization
 * - service keep-alive supervision with cascading policy cleanup
 * - durable write-through of policies, types and services
 */

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod operations;

// Re-export commonly used types
pub use app::{PmsApp, RestoreStats};
pub use config::{LogLevel, LoggingConfig, NodeConfigChange, PmsConfig};
pub use error::{ErrorStatus, PmsError, Result};
pub use operations::{PolicyOperations, PutOutcome, PutPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
