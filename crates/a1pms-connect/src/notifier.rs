//! Callbacks to registered services

use crate::error::{A1Error, A1Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Tells services about node availability changes
#[async_trait]
pub trait ServiceNotifier: Send + Sync {
    /// Report that `node_id` became available
    async fn notify_node_available(&self, callback_url: &str, node_id: &str) -> A1Result<()>;
}

/// Body POSTed to a service callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCallbackInfo<'a> {
    pub ric_id: &'a str,
    pub event_type: &'static str,
}

/// POSTs a JSON event to the callback URL
#[derive(Debug, Clone)]
pub struct HttpServiceNotifier {
    http: reqwest::Client,
}

impl HttpServiceNotifier {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ServiceNotifier for HttpServiceNotifier {
    async fn notify_node_available(&self, callback_url: &str, node_id: &str) -> A1Result<()> {
        let body = ServiceCallbackInfo {
            ric_id: node_id,
            event_type: "AVAILABLE",
        };
        let response = self.http.post(callback_url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(A1Error::Other(format!(
                "callback {} answered {}",
                callback_url, status
            )));
        }
        debug!(callback = %callback_url, node_id = %node_id, "Service notified");
        Ok(())
    }
}
