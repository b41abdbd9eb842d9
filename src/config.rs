/*!
 * Configuration types for A1PMS
 */

use a1pms_core_registry::{A1Dialect, NodeConfig};
use a1pms_sentinel::SupervisionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PmsError, Result};

/// Main service configuration, read from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PmsConfig {
    #[serde(default)]
    pub supervision: SupervisionPolicy,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub southbound: SouthboundConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Managed near-RT RICs
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// Durable state location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted records (None = keep everything in memory)
    #[serde(default)]
    pub database_dir: Option<PathBuf>,
}

/// How nodes are reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SouthboundConfig {
    /// Request timeout in seconds for every southbound call
    #[serde(default = "default_http_timeout")]
    pub http_timeout_s: u64,

    /// Order in which dialects are tried on nodes without a pinned adapter
    #[serde(default = "default_probe_dialects")]
    pub probe_dialects: Vec<A1Dialect>,
}

impl Default for SouthboundConfig {
    fn default() -> Self {
        Self {
            http_timeout_s: default_http_timeout(),
            probe_dialects: default_probe_dialects(),
        }
    }
}

impl SouthboundConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// JSON log file (None = compact output on stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Informational messages (default)
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Difference between two node lists, keyed by node id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeConfigChange {
    Added(NodeConfig),
    Changed(NodeConfig),
    Removed(String),
}

fn default_http_timeout() -> u64 {
    30
}

fn default_probe_dialects() -> Vec<A1Dialect> {
    A1Dialect::ALL.to_vec()
}

impl PmsConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PmsError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&contents)?;
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: PmsConfig = toml::from_str(contents)
            .map_err(|e| PmsError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.supervision.validate().map_err(PmsError::Config)?;

        if self.southbound.http_timeout_s == 0 {
            return Err(PmsError::Config(
                "southbound.http_timeout_s must be greater than zero".to_string(),
            ));
        }
        if self.southbound.probe_dialects.is_empty() {
            return Err(PmsError::Config(
                "southbound.probe_dialects must name at least one dialect".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(PmsError::Config("Node id must not be empty".to_string()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(PmsError::Config(format!("Duplicate node id: {}", node.id)));
            }
            validate_base_url(node)?;
        }
        Ok(())
    }

    /// Node additions, changes and removals going from `old` to `new`.
    ///
    /// Changes come out ordered by node id.
    pub fn node_changes(old: &PmsConfig, new: &PmsConfig) -> Vec<NodeConfigChange> {
        let before: BTreeMap<&str, &NodeConfig> =
            old.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let after: BTreeMap<&str, &NodeConfig> =
            new.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut changes = Vec::new();
        for (id, node) in &after {
            match before.get(id) {
                None => changes.push(NodeConfigChange::Added((*node).clone())),
                Some(previous) if previous != node => {
                    changes.push(NodeConfigChange::Changed((*node).clone()))
                }
                Some(_) => {}
            }
        }
        for id in before.keys() {
            if !after.contains_key(id) {
                changes.push(NodeConfigChange::Removed(id.to_string()));
            }
        }
        changes
    }
}

fn validate_base_url(node: &NodeConfig) -> Result<()> {
    let url = url::Url::parse(&node.base_url).map_err(|e| {
        PmsError::Config(format!(
            "Node {} has an invalid base_url {}: {}",
            node.id, node.base_url, e
        ))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PmsError::Config(format!(
            "Node {} base_url must use http or https, not {}",
            node.id, other
        ))),
    }
}
