//! Supervision timing policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often the background supervisors run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionPolicy {
    /// Period of the node consistency check, in seconds
    ///
    /// **Default:** 30
    pub node_interval_s: u64,

    /// Period of the service keep-alive sweep, in seconds
    ///
    /// **Default:** 10
    pub service_interval_s: u64,
}

impl Default for SupervisionPolicy {
    fn default() -> Self {
        Self {
            node_interval_s: 30,
            service_interval_s: 10,
        }
    }
}

impl SupervisionPolicy {
    pub fn node_interval(&self) -> Duration {
        Duration::from_secs(self.node_interval_s)
    }

    pub fn service_interval(&self) -> Duration {
        Duration::from_secs(self.service_interval_s)
    }

    /// Validate the policy configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.node_interval_s == 0 {
            return Err("node_interval_s must be greater than 0".to_string());
        }

        if self.service_interval_s == 0 {
            return Err("service_interval_s must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = SupervisionPolicy::default();

        assert_eq!(policy.node_interval(), Duration::from_secs(30));
        assert_eq!(policy.service_interval(), Duration::from_secs(10));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut policy = SupervisionPolicy::default();

        policy.node_interval_s = 0;
        assert!(policy.validate().is_err());
        policy.node_interval_s = 30;

        policy.service_interval_s = 0;
        assert!(policy.validate().is_err());
    }
}
