//! Supervision statistics
//!
//! Every tick of either supervisor produces one stats value, which the daemon
//! logs as a one-line summary.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one node supervision tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisionStats {
    /// Nodes inspected against their remote state
    pub checked: usize,

    /// Nodes whose remote state matched the local view
    pub consistent: usize,

    /// Nodes that could not be queried and were marked unavailable
    pub unreachable: usize,

    /// Synchronizations started by this tick
    pub synchronizations_started: usize,

    /// Nodes passed over because a check or repair was already running
    pub skipped: usize,

    /// Time taken by the tick
    pub duration: Option<Duration>,
}

impl SupervisionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_nodes(&self) -> usize {
        self.checked + self.unreachable + self.skipped
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Node supervision: {} nodes | {} consistent | {} synchronizing | {} unreachable | {} skipped",
            self.total_nodes(),
            self.consistent,
            self.synchronizations_started,
            self.unreachable,
            self.skipped
        )
    }
}

/// Outcome of one service keep-alive sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSweepStats {
    pub expired_services: usize,
    pub policies_removed: usize,
    pub remote_delete_failures: usize,
    pub duration: Option<Duration>,
}

impl ServiceSweepStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> String {
        format!(
            "Service sweep: {} expired | {} policies removed | {} remote deletes failed",
            self.expired_services, self.policies_removed, self.remote_delete_failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervision_summary() {
        let stats = SupervisionStats {
            checked: 3,
            consistent: 2,
            unreachable: 1,
            synchronizations_started: 1,
            skipped: 1,
            duration: None,
        };

        assert_eq!(stats.total_nodes(), 5);
        let summary = stats.summary();
        assert!(summary.contains("5 nodes"));
        assert!(summary.contains("2 consistent"));
        assert!(summary.contains("1 unreachable"));
    }

    #[test]
    fn test_sweep_summary() {
        let stats = ServiceSweepStats {
            expired_services: 1,
            policies_removed: 2,
            remote_delete_failures: 1,
            duration: None,
        };
        assert_eq!(
            stats.summary(),
            "Service sweep: 1 expired | 2 policies removed | 1 remote deletes failed"
        );
    }
}
