//! Registered services and their keep-alive state

use crate::error::{EntityKind, RegistryError, RegistryResult};
use crate::storage::{object_name, DataStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const PREFIX: &str = "services";

/// A client of the control plane that owns policies
pub struct Service {
    name: String,
    keep_alive_interval: Duration,
    callback_url: Option<String>,
    last_ping: Mutex<Instant>,
}

impl Service {
    /// Create a service whose heartbeat starts now.
    ///
    /// A zero `keep_alive_interval` means the service never expires.
    pub fn new(
        name: impl Into<String>,
        keep_alive_interval: Duration,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            keep_alive_interval,
            callback_url: callback_url.filter(|url| !url.is_empty()),
            last_ping: Mutex::new(Instant::now()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
    }

    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref()
    }

    /// Refresh the heartbeat
    pub fn keep_alive(&self) {
        *self.last_ping.lock() = Instant::now();
    }

    pub fn time_since_last_ping(&self) -> Duration {
        self.last_ping.lock().elapsed()
    }

    pub fn is_expired(&self) -> bool {
        !self.keep_alive_interval.is_zero()
            && self.time_since_last_ping() > self.keep_alive_interval
    }

    pub fn to_record(&self) -> ServiceRecord {
        ServiceRecord {
            name: self.name.clone(),
            keep_alive_interval_ms: self.keep_alive_interval.as_millis() as u64,
            callback_url: self.callback_url.clone(),
        }
    }

    /// Rebuild from a record; the heartbeat restarts now
    pub fn from_record(record: ServiceRecord) -> Self {
        Self::new(
            record.name,
            Duration::from_millis(record.keep_alive_interval_ms),
            record.callback_url,
        )
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("callback_url", &self.callback_url)
            .field("time_since_last_ping", &self.time_since_last_ping())
            .finish()
    }
}

/// Durable form of a [`Service`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub keep_alive_interval_ms: u64,
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Registry of services
pub struct Services {
    services: Mutex<HashMap<String, Arc<Service>>>,
    store: Arc<dyn DataStore>,
}

impl Services {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Register or replace a service, returning the replaced one
    pub async fn put(&self, service: Arc<Service>) -> Option<Arc<Service>> {
        let previous = self
            .services
            .lock()
            .insert(service.name.clone(), Arc::clone(&service));

        let name = object_name(PREFIX, &service.name);
        match serde_json::to_vec(&service.to_record()) {
            Ok(data) => {
                if let Err(e) = self.store.write_object(&name, &data).await {
                    warn!(service_id = %service.name, error = %e, "Failed to persist service");
                }
            }
            Err(e) => warn!(service_id = %service.name, error = %e, "Failed to encode service"),
        }

        if previous.is_none() {
            info!(
                service_id = %service.name,
                keep_alive_s = service.keep_alive_interval.as_secs(),
                "Service registered"
            );
        }
        previous
    }

    pub fn get(&self, name: &str) -> RegistryResult<Arc<Service>> {
        self.find(name)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Service, name))
    }

    pub fn find(&self, name: &str) -> Option<Arc<Service>> {
        self.services.lock().get(name).cloned()
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<Service>> {
        let removed = self.services.lock().remove(name)?;
        if let Err(e) = self.store.delete_object(&object_name(PREFIX, name)).await {
            warn!(service_id = %name, error = %e, "Failed to delete persisted service");
        }
        info!(service_id = %name, "Service removed");
        Some(removed)
    }

    /// All services, ordered by name
    pub fn list(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<Arc<Service>> = self.services.lock().values().cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Services whose heartbeat has lapsed, ordered by name
    pub fn expired(&self) -> Vec<Arc<Service>> {
        self.list().into_iter().filter(|s| s.is_expired()).collect()
    }

    pub fn size(&self) -> usize {
        self.services.lock().len()
    }

    pub fn clear(&self) {
        self.services.lock().clear();
    }

    /// Reload persisted services with fresh heartbeats
    pub async fn restore(&self) -> usize {
        let names = match self.store.list_objects(PREFIX).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list persisted services");
                return 0;
            }
        };

        let mut restored = 0;
        for name in names {
            let data = match self.store.read_object(&name).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(object = %name, error = %e, "Failed to read persisted service");
                    continue;
                }
            };
            match serde_json::from_slice::<ServiceRecord>(&data) {
                Ok(record) => {
                    let service = Arc::new(Service::from_record(record));
                    self.services
                        .lock()
                        .insert(service.name.clone(), service);
                    restored += 1;
                }
                Err(e) => warn!(object = %name, error = %e, "Skipping corrupt service record"),
            }
        }
        debug!(count = restored, "Restored services");
        restored
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").field("size", &self.size()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn registry() -> (Services, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Services::new(store.clone()), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_expires_after_interval() {
        let service = Service::new("svc1", Duration::from_secs(2), None);
        assert!(!service.is_expired());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!service.is_expired());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(service.is_expired());

        service.keep_alive();
        assert!(!service.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_expires() {
        let service = Service::new("forever", Duration::ZERO, None);
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!service.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lists_only_lapsed_services() {
        let (services, _) = registry();
        services
            .put(Arc::new(Service::new("svc1", Duration::from_secs(2), None)))
            .await;
        services
            .put(Arc::new(Service::new("svc2", Duration::from_secs(10), None)))
            .await;

        tokio::time::advance(Duration::from_secs(3)).await;
        let expired: Vec<String> = services
            .expired()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(expired, vec!["svc1"]);
    }

    #[tokio::test]
    async fn test_empty_callback_is_none() {
        let service = Service::new("svc1", Duration::ZERO, Some(String::new()));
        assert!(service.callback_url().is_none());
    }

    #[tokio::test]
    async fn test_persist_restore_and_remove() {
        let (services, store) = registry();
        services
            .put(Arc::new(Service::new(
                "svc1",
                Duration::from_millis(2500),
                Some("http://svc1/cb".to_string()),
            )))
            .await;
        assert!(store.contains("services/svc1.json"));

        let restored = Services::new(store.clone());
        assert_eq!(restored.restore().await, 1);
        let service = restored.get("svc1").unwrap();
        assert_eq!(service.keep_alive_interval(), Duration::from_millis(2500));
        assert_eq!(service.callback_url(), Some("http://svc1/cb"));

        assert!(services.remove("svc1").await.is_some());
        assert!(!store.contains("services/svc1.json"));
        assert!(services.get("svc1").unwrap_err().is_not_found());
    }
}
