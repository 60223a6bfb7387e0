//! Cluster object model consumed by the record engine.
//!
//! The informer machinery that watches the cluster API is an external
//! collaborator; it delivers the snapshot shapes below through the engine's
//! event handlers and keeps the keyed stores synced. Snapshots also
//! round-trip through serde for the static inventory seed and diagnostics.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::DnsError;

/// Sentinel cluster IP marking a service as headless.
pub const CLUSTER_IP_NONE: &str = "None";

/// Well-known node label carrying the cloud provider zone.
pub const ZONE_LABEL: &str = "failure-domain.beta.kubernetes.io/zone";

/// Well-known node label carrying the cloud provider region.
pub const REGION_LABEL: &str = "failure-domain.beta.kubernetes.io/region";

/// Namespace/name pair identifying an object in a keyed store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object namespace.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Builds a key from a namespace and name.
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Service flavor, which drives record synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceFlavor {
    /// Service with assigned cluster IPs; projected as A plus SRV records.
    ClusterIp,
    /// Service without a cluster IP; projected from endpoint addresses.
    Headless,
    /// Alias for an external name; projected as a single CNAME.
    ExternalName,
}

/// One named port of a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePort {
    /// Port name; unnamed ports get no SRV record.
    #[serde(default)]
    pub name: String,
    /// Port protocol (e.g., "TCP").
    #[serde(default)]
    pub protocol: String,
    /// Port number.
    pub port: u16,
}

/// Point-in-time view of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    /// Service name.
    pub name: String,
    /// Service namespace.
    pub namespace: String,
    /// Assigned cluster IPs; empty or the `"None"` sentinel for headless
    /// services.
    #[serde(default)]
    pub cluster_ips: Vec<String>,
    /// Service ports.
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    /// External name; present exactly for ExternalName services.
    #[serde(default)]
    pub external_name: Option<String>,
}

impl ServiceSnapshot {
    /// The service's store key.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Cluster IPs with the empty and `"None"` sentinels filtered out.
    pub fn cluster_ips(&self) -> Vec<&str> {
        self.cluster_ips
            .iter()
            .map(String::as_str)
            .filter(|ip| !ip.is_empty() && *ip != CLUSTER_IP_NONE)
            .collect()
    }

    /// Whether the service has an assigned cluster IP.
    pub fn is_ip_set(&self) -> bool {
        !self.cluster_ips().is_empty()
    }

    /// The flavor driving this service's record synthesis.
    pub fn flavor(&self) -> ServiceFlavor {
        if self.external_name.is_some() {
            ServiceFlavor::ExternalName
        } else if self.is_ip_set() {
            ServiceFlavor::ClusterIp
        } else {
            ServiceFlavor::Headless
        }
    }
}

/// One endpoint address; the hostname, when present, names the endpoint in
/// DNS and makes it eligible for a PTR record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointAddress {
    /// Endpoint IP.
    pub ip: String,
    /// Optional endpoint hostname.
    #[serde(default)]
    pub hostname: Option<String>,
}

impl EndpointAddress {
    /// The endpoint hostname, treating an empty string as absent.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref().filter(|h| !h.is_empty())
    }
}

/// One named port of an endpoints subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointPort {
    /// Port name; unnamed ports get no SRV record.
    #[serde(default)]
    pub name: String,
    /// Port protocol (e.g., "TCP").
    #[serde(default)]
    pub protocol: String,
    /// Port number.
    pub port: u16,
}

/// One subset of an endpoints object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointSubset {
    /// Addresses in the subset.
    #[serde(default)]
    pub addresses: Vec<EndpointAddress>,
    /// Ports in the subset.
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

/// Point-in-time view of a service's endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsSnapshot {
    /// Owning service name.
    pub name: String,
    /// Owning service namespace.
    pub namespace: String,
    /// Endpoint subsets.
    #[serde(default)]
    pub subsets: Vec<EndpointSubset>,
}

impl EndpointsSnapshot {
    /// The owning service's store key.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

/// A cluster node; only its locality labels matter to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node name.
    pub name: String,
    /// Node labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl NodeSnapshot {
    /// The node's zone and region labels, when both are present and
    /// non-empty.
    pub fn zone_and_region(&self) -> Option<(String, String)> {
        let zone = self.labels.get(ZONE_LABEL).filter(|v| !v.is_empty())?;
        let region = self.labels.get(REGION_LABEL).filter(|v| !v.is_empty())?;
        Some((zone.clone(), region.clone()))
    }
}

/// Thread-safe keyed object store, the engine's view of an informer cache.
#[derive(Debug)]
pub struct Store<T> {
    inner: Arc<RwLock<HashMap<ObjectKey, T>>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Store<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Inserts or replaces the object at `key`.
    pub fn insert(&self, key: ObjectKey, value: T) {
        self.inner.write().insert(key, value);
    }

    /// Removes and returns the object at `key`.
    pub fn remove(&self, key: &ObjectKey) -> Option<T> {
        self.inner.write().remove(key)
    }

    /// The object at `key`, if present.
    pub fn get(&self, key: &ObjectKey) -> Option<T> {
        self.inner.read().get(key).cloned()
    }

    /// All stored objects, in no particular order.
    pub fn list(&self) -> Vec<T> {
        self.inner.read().values().cloned().collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// One-shot node listing, the only cluster API call the engine makes and
/// only while the node cache is cold.
pub trait NodeLister: Send + Sync {
    /// Lists the cluster's nodes. A bounded network call in production.
    fn list_nodes(&self) -> Result<Vec<NodeSnapshot>, DnsError>;
}

/// Fixed node list; backs tests and the static inventory seed.
#[derive(Debug, Clone, Default)]
pub struct StaticNodeList(pub Vec<NodeSnapshot>);

impl NodeLister for StaticNodeList {
    fn list_nodes(&self) -> Result<Vec<NodeSnapshot>, DnsError> {
        Ok(self.0.clone())
    }
}
