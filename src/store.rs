//! The record store: the tree cache, the reverse index, and the
//! cluster-IP-to-service map guarded as a single unit.
//!
//! The three structures are mutually dependent, so one reader-writer lock
//! covers them all; every mutation here is a complete service-scoped
//! transition, and readers observe the state entirely before or entirely
//! after it, never a torn view.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::cluster::ServiceSnapshot;
use crate::records::RecordValue;
use crate::synthesize::StagedService;
use crate::treecache::TreeCache;

#[derive(Debug, Default)]
struct StoreInner {
    cache: TreeCache,

    /// IP -> payload whose host answers PTR queries for that IP.
    reverse: HashMap<String, Arc<RecordValue>>,

    /// Cluster IP -> owning service. Headless services never appear here.
    cluster_ip_services: HashMap<String, ServiceSnapshot>,

    /// Bumped on every mutation; serves as the zone serial.
    serial: u32,
}

/// Thread-safe record store shared between the reconciler and the query
/// path.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically swaps in a service's staged subtree at `path -> label`,
    /// drops reverse and service-map entries for `stale_ips`, installs the
    /// staged reverse entries, and registers `cluster_ip_services` pairs.
    pub fn install_subtree(
        &self,
        label: &str,
        path: &[&str],
        staged: StagedService,
        cluster_ip_services: Vec<(String, ServiceSnapshot)>,
        stale_ips: &[String],
    ) {
        let mut inner = self.inner.write();
        inner.cache.set_sub_cache(label, staged.subtree, path);
        for ip in stale_ips {
            inner.reverse.remove(ip);
            inner.cluster_ip_services.remove(ip);
        }
        for (ip, record) in staged.reverse {
            inner.reverse.insert(ip, record);
        }
        for (ip, svc) in cluster_ip_services {
            inner.cluster_ip_services.insert(ip, svc);
        }
        inner.serial = inner.serial.wrapping_add(1);
    }

    /// Atomically inserts a single leaf (the ExternalName CNAME).
    pub fn install_leaf(&self, key: &str, record: Arc<RecordValue>, fqdn: &str, path: &[&str]) {
        let mut inner = self.inner.write();
        inner.cache.set_entry(key, record, fqdn, path);
        inner.serial = inner.serial.wrapping_add(1);
    }

    /// Atomically removes the node (or leaf) at `path` along with the
    /// reverse and service-map entries for `ips`. Returns whether the
    /// cache held anything at that path.
    pub fn remove_service(&self, path: &[&str], ips: &[String]) -> bool {
        let mut inner = self.inner.write();
        let removed = inner.cache.delete_path(path);
        for ip in ips {
            inner.reverse.remove(ip);
            inner.cluster_ip_services.remove(ip);
        }
        inner.serial = inner.serial.wrapping_add(1);
        removed
    }

    /// Drops reverse and service-map entries for cluster IPs a service no
    /// longer holds, when no subtree reinstall carries the cleanup.
    pub fn drop_cluster_ips(&self, ips: &[String]) {
        if ips.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        for ip in ips {
            inner.reverse.remove(ip);
            inner.cluster_ip_services.remove(ip);
        }
        inner.serial = inner.serial.wrapping_add(1);
    }

    /// Drops reverse entries only. Best-effort cleanup for endpoint
    /// addresses that disappeared or lost their hostname; the flat reverse
    /// index is not covered by subtree swaps.
    pub fn drop_reverse(&self, ips: &[String]) {
        if ips.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        for ip in ips {
            if inner.reverse.remove(ip).is_some() {
                debug!(ip = %ip, "dropped reverse entry");
            }
        }
        inner.serial = inner.serial.wrapping_add(1);
    }

    /// Exact leaf lookup.
    pub fn get_entry(&self, key: &str, path: &[&str]) -> Option<Arc<RecordValue>> {
        self.inner.read().cache.get_entry(key, path)
    }

    /// Subtree lookup with wildcard semantics.
    pub fn get_values_for_path_with_wildcards(&self, path: &[&str]) -> Vec<Arc<RecordValue>> {
        self.inner.read().cache.get_values_for_path_with_wildcards(path)
    }

    /// PTR lookup for an IP.
    pub fn lookup_reverse(&self, ip: &str) -> Option<Arc<RecordValue>> {
        self.inner.read().reverse.get(ip).cloned()
    }

    /// The service owning `cluster_ip`, if any.
    pub fn service_for_ip(&self, cluster_ip: &str) -> Option<ServiceSnapshot> {
        self.inner.read().cluster_ip_services.get(cluster_ip).cloned()
    }

    /// Scans `records` under one read lock for a usable local federation
    /// target. A record whose host is absent from the cluster-IP map
    /// belongs to a headless service and is valid as-is (its presence in
    /// the cache proves it has endpoints); otherwise `has_endpoints`
    /// decides from the owning service. Lookup failures skip the record.
    pub fn has_local_federation_target<F>(
        &self,
        records: &[Arc<RecordValue>],
        has_endpoints: F,
    ) -> bool
    where
        F: Fn(&ServiceSnapshot) -> Result<bool, crate::error::DnsError>,
    {
        let inner = self.inner.read();
        for record in records {
            match inner.cluster_ip_services.get(&record.host) {
                None => return true,
                Some(svc) => match has_endpoints(svc) {
                    Ok(true) => return true,
                    Ok(false) => {
                        debug!(host = %record.host, "skipping record, service has no endpoints");
                    }
                    Err(err) => {
                        debug!(host = %record.host, error = %err, "skipping record, endpoints lookup failed");
                    }
                },
            }
        }
        false
    }

    /// Current zone serial.
    pub fn serial(&self) -> u32 {
        self.inner.read().serial
    }

    /// Number of reverse-index entries (for metrics).
    pub fn reverse_len(&self) -> usize {
        self.inner.read().reverse.len()
    }

    /// Number of cluster IPs mapped to services (for metrics).
    pub fn cluster_ip_len(&self) -> usize {
        self.inner.read().cluster_ip_services.len()
    }

    /// Diagnostic JSON dump of the tree cache.
    pub fn cache_as_json(&self) -> Result<String, serde_json::Error> {
        self.inner.read().cache.serialize()
    }
}
