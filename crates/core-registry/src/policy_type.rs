//! Policy types: named, versioned schemas

use crate::error::{EntityKind, RegistryError, RegistryResult, RejectStatus};
use crate::storage::{object_name, DataStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

const PREFIX: &str = "policytypes";

/// Semantic version carried in a type id (`<name>_<major.minor.patch>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl TypeVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// A candidate is compatible with a requested version when it shares the
    /// major version and is not older
    pub fn is_compatible_with(&self, requested: &TypeVersion) -> bool {
        self.major == requested.major && self >= requested
    }
}

impl Ord for TypeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for TypeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for TypeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let mut next = |what: &str| -> Result<u32, String> {
            parts
                .next()
                .ok_or_else(|| format!("version '{}' is missing its {} part", s, what))?
                .parse::<u32>()
                .map_err(|e| format!("version '{}' has an invalid {} part: {}", s, what, e))
        };
        let version = TypeVersion::new(next("major")?, next("minor")?, next("patch")?);
        if parts.next().is_some() {
            return Err(format!("version '{}' has more than three parts", s));
        }
        Ok(version)
    }
}

impl fmt::Display for TypeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// An immutable policy schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyType {
    pub id: String,
    pub schema: String,
}

impl PolicyType {
    pub fn new(id: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema: schema.into(),
        }
    }

    fn split_id(&self) -> (&str, Option<TypeVersion>) {
        if let Some((name, version)) = self.id.rsplit_once('_') {
            if let Ok(version) = version.parse::<TypeVersion>() {
                return (name, Some(version));
            }
        }
        (&self.id, None)
    }

    /// Name part of the id; the whole id when it is not versioned
    pub fn type_name(&self) -> &str {
        self.split_id().0
    }

    pub fn version(&self) -> Option<TypeVersion> {
        self.split_id().1
    }
}

/// Registry of all known policy types
pub struct PolicyTypes {
    types: Mutex<HashMap<String, Arc<PolicyType>>>,
    store: Arc<dyn DataStore>,
}

impl PolicyTypes {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            types: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Add or replace a type and persist it
    pub async fn put(&self, policy_type: Arc<PolicyType>) {
        self.types
            .lock()
            .insert(policy_type.id.clone(), Arc::clone(&policy_type));

        let name = object_name(PREFIX, &policy_type.id);
        match serde_json::to_vec(policy_type.as_ref()) {
            Ok(data) => {
                if let Err(e) = self.store.write_object(&name, &data).await {
                    warn!(policy_type_id = %policy_type.id, error = %e, "Failed to persist policy type");
                }
            }
            Err(e) => {
                warn!(policy_type_id = %policy_type.id, error = %e, "Failed to encode policy type");
            }
        }
    }

    pub fn get(&self, id: &str) -> RegistryResult<Arc<PolicyType>> {
        self.find(id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::PolicyType, id))
    }

    pub fn find(&self, id: &str) -> Option<Arc<PolicyType>> {
        self.types.lock().get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<PolicyType>> {
        let removed = self.types.lock().remove(id);
        if removed.is_some() {
            if let Err(e) = self.store.delete_object(&object_name(PREFIX, id)).await {
                warn!(policy_type_id = %id, error = %e, "Failed to delete persisted policy type");
            }
        }
        removed
    }

    /// All types, ordered by id
    pub fn list(&self) -> Vec<Arc<PolicyType>> {
        let mut types: Vec<Arc<PolicyType>> = self.types.lock().values().cloned().collect();
        types.sort_by(|a, b| a.id.cmp(&b.id));
        types
    }

    pub fn size(&self) -> usize {
        self.types.lock().len()
    }

    pub fn clear(&self) {
        self.types.lock().clear();
    }

    /// Types matching a name and, optionally, compatible with a version.
    ///
    /// Without a version the result is ordered by id. With one, only versioned
    /// types sharing the requested major version and not older are returned,
    /// ascending by version. A version without a name is rejected.
    pub fn filter(
        &self,
        type_name: Option<&str>,
        compatible_with: Option<&str>,
    ) -> RegistryResult<Vec<Arc<PolicyType>>> {
        let requested = match compatible_with {
            None => None,
            Some(version) => {
                if type_name.is_none() {
                    return Err(RegistryError::rejected(
                        RejectStatus::BadRequest,
                        "type name must be given when filtering on compatible version",
                    ));
                }
                let parsed = version.parse::<TypeVersion>().map_err(|e| {
                    RegistryError::rejected(RejectStatus::BadRequest, e)
                })?;
                Some(parsed)
            }
        };

        let named: Vec<Arc<PolicyType>> = self
            .list()
            .into_iter()
            .filter(|t| type_name.map_or(true, |name| t.type_name() == name))
            .collect();

        let Some(requested) = requested else {
            return Ok(named);
        };

        let mut compatible: Vec<(TypeVersion, Arc<PolicyType>)> = named
            .into_iter()
            .filter_map(|t| t.version().map(|v| (v, t)))
            .filter(|(v, _)| v.is_compatible_with(&requested))
            .collect();
        compatible.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(compatible.into_iter().map(|(_, t)| t).collect())
    }

    /// Reload persisted types, returning how many were restored
    pub async fn restore(&self) -> usize {
        let names = match self.store.list_objects(PREFIX).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list persisted policy types");
                return 0;
            }
        };

        let mut restored = 0;
        for name in names {
            let record = match self.store.read_object(&name).await {
                Ok(data) => serde_json::from_slice::<PolicyType>(&data),
                Err(e) => {
                    warn!(object = %name, error = %e, "Failed to read persisted policy type");
                    continue;
                }
            };
            match record {
                Ok(policy_type) => {
                    self.types
                        .lock()
                        .insert(policy_type.id.clone(), Arc::new(policy_type));
                    restored += 1;
                }
                Err(e) => warn!(object = %name, error = %e, "Skipping corrupt policy type record"),
            }
        }
        debug!(count = restored, "Restored policy types");
        restored
    }
}

impl fmt::Debug for PolicyTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyTypes")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn registry() -> (PolicyTypes, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PolicyTypes::new(store.clone()), store)
    }

    fn ids(types: &[Arc<PolicyType>]) -> Vec<&str> {
        types.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_version_compatibility() {
        let v = |s: &str| s.parse::<TypeVersion>().unwrap();

        assert!(v("1.9.0").is_compatible_with(&v("1.0.0")));
        assert!(v("1.0.0").is_compatible_with(&v("1.0.0")));
        assert!(!v("2.0.0").is_compatible_with(&v("1.9.0")));
        assert!(!v("1.2.0").is_compatible_with(&v("1.3.0")));
        assert!(v("1.2.10") > v("1.2.9"));
    }

    #[test]
    fn test_version_parse_errors() {
        assert!("1.0".parse::<TypeVersion>().is_err());
        assert!("1.0.0.0".parse::<TypeVersion>().is_err());
        assert!("1.x.0".parse::<TypeVersion>().is_err());
    }

    #[test]
    fn test_type_name_and_version() {
        let versioned = PolicyType::new("std_qos_1.2.3", "{}");
        assert_eq!(versioned.type_name(), "std_qos");
        assert_eq!(versioned.version(), Some(TypeVersion::new(1, 2, 3)));

        let plain = PolicyType::new("t1", "{}");
        assert_eq!(plain.type_name(), "t1");
        assert_eq!(plain.version(), None);

        let underscore_only = PolicyType::new("qos_latest", "{}");
        assert_eq!(underscore_only.type_name(), "qos_latest");
    }

    #[tokio::test]
    async fn test_compatible_filter_sorted_by_version() {
        let (types, _) = registry();
        for id in ["A_1.10.0", "A_2.0.0", "A_1.9.0", "A_1.0.0", "B_1.9.0", "A"] {
            types.put(Arc::new(PolicyType::new(id, "{}"))).await;
        }

        let found = types.filter(Some("A"), Some("1.0.0")).unwrap();
        assert_eq!(ids(&found), vec!["A_1.0.0", "A_1.9.0", "A_1.10.0"]);

        let found = types.filter(Some("A"), Some("1.9.0")).unwrap();
        assert_eq!(ids(&found), vec!["A_1.9.0", "A_1.10.0"]);

        let found = types.filter(Some("A"), Some("2.0.0")).unwrap();
        assert_eq!(ids(&found), vec!["A_2.0.0"]);
    }

    #[tokio::test]
    async fn test_filter_by_name_only() {
        let (types, _) = registry();
        for id in ["A_1.0.0", "A_2.0.0", "B_1.0.0"] {
            types.put(Arc::new(PolicyType::new(id, "{}"))).await;
        }

        assert_eq!(ids(&types.filter(Some("A"), None).unwrap()), vec!["A_1.0.0", "A_2.0.0"]);
        assert_eq!(types.filter(None, None).unwrap().len(), 3);
    }

    #[test]
    fn test_version_filter_requires_name() {
        let (types, _) = registry();
        let err = types.filter(None, Some("1.0.0")).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Rejected {
                status: RejectStatus::BadRequest,
                ..
            }
        ));
        assert!(types.filter(Some("A"), Some("one")).is_err());
    }

    #[tokio::test]
    async fn test_put_persists_and_restores() {
        let (types, store) = registry();
        types.put(Arc::new(PolicyType::new("t1", "{\"type\":\"object\"}"))).await;
        assert!(store.contains("policytypes/t1.json"));

        let restored = PolicyTypes::new(store.clone());
        assert_eq!(restored.restore().await, 1);
        assert_eq!(restored.get("t1").unwrap().schema, "{\"type\":\"object\"}");

        assert!(types.remove("t1").await.is_some());
        assert!(!store.contains("policytypes/t1.json"));
        assert!(types.get("t1").unwrap_err().is_not_found());
    }
}
