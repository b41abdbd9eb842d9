//! Error types for the a1pms-connect crate

use thiserror::Error;

pub type A1Result<T> = Result<T, A1Error>;

#[derive(Error, Debug)]
pub enum A1Error {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Node {node_id} answered {status}: {body}")]
    Status {
        node_id: String,
        status: u16,
        body: String,
    },

    #[error("Protocol error from node {node_id}: {reason}")]
    Protocol { node_id: String, reason: String },

    #[error("No A1 dialect answered on node {node_id}")]
    NoDialect { node_id: String },

    #[error("Unknown southbound adapter: {0}")]
    UnknownAdapter(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Southbound error: {0}")]
    Other(String),
}

impl A1Error {
    pub(crate) fn protocol(node_id: &str, reason: impl Into<String>) -> Self {
        A1Error::Protocol {
            node_id: node_id.to_string(),
            reason: reason.into(),
        }
    }

    /// HTTP status of a rejected call, if the node answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            A1Error::Status { status, .. } => Some(*status),
            A1Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
