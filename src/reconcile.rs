//! Event-driven reconciliation: service and endpoints events drive record
//! synthesis and atomic installation into the record store.
//!
//! The informer machinery delivers events serially per resource kind but
//! concurrently across kinds. Handlers keep the object stores current and
//! perform each service-scoped mutation under the record-store lock, so a
//! reader sees any given service entirely before or entirely after an
//! update. Malformed or unmatchable events are logged and skipped; a later
//! resync re-delivers them.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::cluster::{EndpointsSnapshot, ServiceFlavor, ServiceSnapshot};
use crate::engine::DnsEngine;
use crate::metrics::{self, ReconcileOp};
use crate::synthesize::{
    external_name_record, headless_records, portal_records, SERVICE_SUBDOMAIN,
};

impl DnsEngine {
    /// Handles a service appearing.
    pub fn on_service_added(&self, svc: ServiceSnapshot) {
        metrics::record_reconcile_event("service", ReconcileOp::Add);
        debug!(service = %svc.key(), flavor = ?svc.flavor(), "new service");
        self.services.insert(svc.key(), svc.clone());
        self.add_service_records(&svc, &[]);
    }

    /// Handles a service update. A flip to or from ExternalName tears the
    /// old records down first; otherwise records are replaced in place,
    /// with reverse entries for departed cluster IPs dropped in the same
    /// locked region as the subtree swap.
    pub fn on_service_updated(&self, old: ServiceSnapshot, new: ServiceSnapshot) {
        metrics::record_reconcile_event("service", ReconcileOp::Update);
        let flipped = (old.flavor() == ServiceFlavor::ExternalName)
            != (new.flavor() == ServiceFlavor::ExternalName);
        if flipped {
            debug!(service = %new.key(), "service flavor flipped, replacing records");
            self.remove_service_records(&old);
            self.services.insert(new.key(), new.clone());
            self.add_service_records(&new, &[]);
            return;
        }

        self.services.insert(new.key(), new.clone());

        let new_ips: HashSet<&str> = new.cluster_ips().into_iter().collect();
        let stale: Vec<String> = old
            .cluster_ips()
            .into_iter()
            .filter(|ip| !new_ips.contains(ip))
            .map(String::from)
            .collect();
        self.add_service_records(&new, &stale);
    }

    /// Handles a service deletion.
    pub fn on_service_deleted(&self, svc: ServiceSnapshot) {
        metrics::record_reconcile_event("service", ReconcileOp::Delete);
        self.services.remove(&svc.key());
        self.remove_service_records(&svc);
    }

    /// Handles endpoints appearing.
    pub fn on_endpoints_added(&self, endpoints: EndpointsSnapshot) {
        metrics::record_reconcile_event("endpoints", ReconcileOp::Add);
        self.endpoints.insert(endpoints.key(), endpoints.clone());
        self.add_records_from_endpoints(&endpoints);
    }

    /// Handles an endpoints update. The subtree reinstall does not touch
    /// the flat reverse index, so addresses that disappeared or lost their
    /// hostname have their PTR entries dropped explicitly first.
    pub fn on_endpoints_updated(&self, old: EndpointsSnapshot, new: EndpointsSnapshot) {
        metrics::record_reconcile_event("endpoints", ReconcileOp::Update);
        self.endpoints.insert(new.key(), new.clone());

        if let Some(svc) = self.services.get(&old.key()) {
            if svc.flavor() == ServiceFlavor::Headless {
                let mut unnamed: HashSet<String> = old
                    .subsets
                    .iter()
                    .flat_map(|subset| &subset.addresses)
                    .filter(|address| address.hostname().is_some())
                    .map(|address| address.ip.clone())
                    .collect();
                for subset in &new.subsets {
                    for address in &subset.addresses {
                        if address.hostname().is_some() {
                            unnamed.remove(&address.ip);
                        }
                    }
                }
                let dropped: Vec<String> = unnamed.into_iter().collect();
                self.store.drop_reverse(&dropped);
            }
        }

        self.add_records_from_endpoints(&new);
    }

    /// Handles endpoints deletion: for headless services, the PTR entries
    /// of named addresses go with them.
    pub fn on_endpoints_deleted(&self, endpoints: EndpointsSnapshot) {
        metrics::record_reconcile_event("endpoints", ReconcileOp::Delete);
        self.endpoints.remove(&endpoints.key());

        let Some(svc) = self.services.get(&endpoints.key()) else {
            return;
        };
        if svc.flavor() != ServiceFlavor::Headless {
            return;
        }
        let named: Vec<String> = endpoints
            .subsets
            .iter()
            .flat_map(|subset| &subset.addresses)
            .filter(|address| address.hostname().is_some())
            .map(|address| address.ip.clone())
            .collect();
        self.store.drop_reverse(&named);
    }

    /// Synthesizes and installs records for `svc`, clearing reverse and
    /// service-map entries for `stale_ips` in the same transition.
    fn add_service_records(&self, svc: &ServiceSnapshot, stale_ips: &[String]) {
        match svc.flavor() {
            ServiceFlavor::ExternalName => {
                let Some((key, record, fqdn)) = external_name_record(svc, &self.domain) else {
                    return;
                };
                debug!(service = %svc.key(), target = %record.host, "storing CNAME");
                self.store
                    .install_leaf(&key, record, &fqdn, &self.namespace_path(&svc.namespace));
            }
            ServiceFlavor::Headless => {
                let Some(endpoints) = self.endpoints.get(&svc.key()) else {
                    debug!(
                        service = %svc.key(),
                        "no endpoints for headless service, records will appear once they do"
                    );
                    self.store.drop_cluster_ips(stale_ips);
                    return;
                };
                let staged = headless_records(svc, &endpoints, &self.domain);
                self.store.install_subtree(
                    &svc.name,
                    &self.namespace_path(&svc.namespace),
                    staged,
                    Vec::new(),
                    stale_ips,
                );
            }
            ServiceFlavor::ClusterIp => {
                if svc.ports.is_empty() {
                    warn!(service = %svc.key(), "service with no ports");
                }
                let staged = portal_records(svc, &self.domain);
                let cluster_ip_services = svc
                    .cluster_ips()
                    .into_iter()
                    .map(|ip| (ip.to_string(), svc.clone()))
                    .collect();
                self.store.install_subtree(
                    &svc.name,
                    &self.namespace_path(&svc.namespace),
                    staged,
                    cluster_ip_services,
                    stale_ips,
                );
            }
        }
    }

    /// Installs headless records for the service owning `endpoints`, or
    /// drops the event when no headless owner exists.
    fn add_records_from_endpoints(&self, endpoints: &EndpointsSnapshot) {
        let Some(svc) = self.services.get(&endpoints.key()) else {
            debug!(endpoints = %endpoints.key(), "no service for endpoints");
            metrics::record_event_dropped("endpoints", "no_service");
            return;
        };
        if svc.flavor() != ServiceFlavor::Headless {
            metrics::record_event_dropped("endpoints", "not_headless");
            return;
        }
        let staged = headless_records(&svc, endpoints, &self.domain);
        self.store.install_subtree(
            &svc.name,
            &self.namespace_path(&svc.namespace),
            staged,
            Vec::new(),
            &[],
        );
    }

    /// Tears down all records for `svc`: the subtree (or CNAME leaf) at
    /// its name plus the reverse and service-map entries for its cluster
    /// IPs.
    fn remove_service_records(&self, svc: &ServiceSnapshot) {
        let mut path = self.namespace_path(&svc.namespace);
        path.push(&svc.name);
        let ips: Vec<String> = svc.cluster_ips().into_iter().map(String::from).collect();
        let removed = self.store.remove_service(&path, &ips);
        debug!(service = %svc.key(), removed, "removed service records");
    }

    /// `[domain_path.., "svc", namespace]`, the parent path of every
    /// service's records.
    pub(crate) fn namespace_path<'a>(&'a self, namespace: &'a str) -> Vec<&'a str> {
        let mut path: Vec<&str> = self.domain_path.iter().map(String::as_str).collect();
        path.push(SERVICE_SUBDOMAIN);
        path.push(namespace);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{EndpointAddress, EndpointPort, EndpointSubset, ServicePort};

    fn engine() -> DnsEngine {
        DnsEngine::new("cluster.local")
    }

    fn cluster_ip_service(name: &str, ns: &str, ip: &str, port: u16) -> ServiceSnapshot {
        ServiceSnapshot {
            name: name.to_string(),
            namespace: ns.to_string(),
            cluster_ips: vec![ip.to_string()],
            ports: vec![ServicePort {
                name: "http".to_string(),
                protocol: "TCP".to_string(),
                port,
            }],
            external_name: None,
        }
    }

    fn headless_service(name: &str, ns: &str) -> ServiceSnapshot {
        ServiceSnapshot {
            name: name.to_string(),
            namespace: ns.to_string(),
            cluster_ips: Vec::new(),
            ports: Vec::new(),
            external_name: None,
        }
    }

    fn endpoints(name: &str, ns: &str, ip: &str, hostname: Option<&str>) -> EndpointsSnapshot {
        EndpointsSnapshot {
            name: name.to_string(),
            namespace: ns.to_string(),
            subsets: vec![EndpointSubset {
                addresses: vec![EndpointAddress {
                    ip: ip.to_string(),
                    hostname: hostname.map(String::from),
                }],
                ports: vec![EndpointPort {
                    name: "sql".to_string(),
                    protocol: "TCP".to_string(),
                    port: 5432,
                }],
            }],
        }
    }

    #[test]
    fn service_add_installs_records_and_reverse() {
        let engine = engine();
        engine.on_service_added(cluster_ip_service("web", "prod", "10.0.0.5", 80));

        let values = engine
            .store
            .get_values_for_path_with_wildcards(&["local", "cluster", "svc", "prod", "web"]);
        assert_eq!(values.len(), 2);
        assert_eq!(
            engine.store.lookup_reverse("10.0.0.5").unwrap().host,
            "web.prod.svc.cluster.local"
        );
        assert!(engine.store.service_for_ip("10.0.0.5").is_some());
    }

    #[test]
    fn service_update_drops_departed_cluster_ips() {
        let engine = engine();
        let old = cluster_ip_service("web", "prod", "10.0.0.5", 80);
        engine.on_service_added(old.clone());

        let new = cluster_ip_service("web", "prod", "10.0.0.9", 80);
        engine.on_service_updated(old, new);

        assert!(engine.store.lookup_reverse("10.0.0.5").is_none());
        assert!(engine.store.service_for_ip("10.0.0.5").is_none());
        assert!(engine.store.lookup_reverse("10.0.0.9").is_some());
    }

    #[test]
    fn service_delete_clears_subtree_and_reverse() {
        let engine = engine();
        let svc = cluster_ip_service("web", "prod", "10.0.0.5", 80);
        engine.on_service_added(svc.clone());
        engine.on_service_deleted(svc);

        assert!(engine
            .store
            .get_values_for_path_with_wildcards(&["local", "cluster", "svc", "prod", "web"])
            .is_empty());
        assert!(engine.store.lookup_reverse("10.0.0.5").is_none());
        assert_eq!(engine.store.cluster_ip_len(), 0);
    }

    #[test]
    fn flavor_flip_replaces_cname_with_addresses() {
        let engine = engine();
        let external = ServiceSnapshot {
            name: "web".to_string(),
            namespace: "prod".to_string(),
            cluster_ips: Vec::new(),
            ports: Vec::new(),
            external_name: Some("example.com".to_string()),
        };
        engine.on_service_added(external.clone());
        assert!(engine
            .store
            .get_entry("web", &["local", "cluster", "svc", "prod"])
            .is_some());

        engine.on_service_updated(external, cluster_ip_service("web", "prod", "10.0.0.9", 80));

        assert!(engine
            .store
            .get_entry("web", &["local", "cluster", "svc", "prod"])
            .is_none());
        let values = engine
            .store
            .get_values_for_path_with_wildcards(&["local", "cluster", "svc", "prod", "web"]);
        assert!(values.iter().any(|r| r.host == "10.0.0.9"));
        assert!(engine.store.lookup_reverse("10.0.0.9").is_some());
    }

    #[test]
    fn endpoints_before_service_then_service_add() {
        let engine = engine();
        engine.on_endpoints_added(endpoints("db", "prod", "10.0.0.7", Some("db-0")));
        // Dropped: no owning service yet.
        assert!(engine
            .store
            .get_values_for_path_with_wildcards(&["local", "cluster", "svc", "prod", "db"])
            .is_empty());

        engine.on_service_added(headless_service("db", "prod"));
        let a = engine
            .store
            .get_entry("db-0", &["local", "cluster", "svc", "prod", "db"])
            .unwrap();
        assert_eq!(a.host, "10.0.0.7");
        assert!(engine.store.lookup_reverse("10.0.0.7").is_some());
    }

    #[test]
    fn endpoints_for_cluster_ip_service_are_ignored() {
        let engine = engine();
        engine.on_service_added(cluster_ip_service("web", "prod", "10.0.0.5", 80));
        engine.on_endpoints_added(endpoints("web", "prod", "10.0.0.7", Some("w-0")));

        // The portal subtree is untouched and no endpoint PTR appears.
        assert!(engine.store.lookup_reverse("10.0.0.7").is_none());
        assert!(engine
            .store
            .get_entry("w-0", &["local", "cluster", "svc", "prod", "web"])
            .is_none());
    }

    #[test]
    fn endpoints_update_drops_reverse_for_lost_hostname() {
        let engine = engine();
        engine.on_service_added(headless_service("db", "prod"));
        let old = endpoints("db", "prod", "10.0.0.7", Some("db-0"));
        engine.on_endpoints_added(old.clone());
        assert!(engine.store.lookup_reverse("10.0.0.7").is_some());

        let new = endpoints("db", "prod", "10.0.0.7", None);
        engine.on_endpoints_updated(old, new);

        assert!(engine.store.lookup_reverse("10.0.0.7").is_none());
        // The A record remains, now keyed by the hash label.
        let values = engine
            .store
            .get_values_for_path_with_wildcards(&["local", "cluster", "svc", "prod", "db"]);
        assert!(values.iter().any(|r| r.host == "10.0.0.7"));
    }

    #[test]
    fn endpoints_update_keeps_reverse_for_still_named_address() {
        let engine = engine();
        engine.on_service_added(headless_service("db", "prod"));
        let old = endpoints("db", "prod", "10.0.0.7", Some("db-0"));
        engine.on_endpoints_added(old.clone());

        engine.on_endpoints_updated(old.clone(), old);
        assert!(engine.store.lookup_reverse("10.0.0.7").is_some());
    }

    #[test]
    fn endpoints_delete_drops_named_reverse_entries() {
        let engine = engine();
        engine.on_service_added(headless_service("db", "prod"));
        let eps = endpoints("db", "prod", "10.0.0.7", Some("db-0"));
        engine.on_endpoints_added(eps.clone());
        engine.on_endpoints_deleted(eps);

        assert!(engine.store.lookup_reverse("10.0.0.7").is_none());
    }

    #[test]
    fn convergence_is_order_independent() {
        // Two isomorphic event orders converge to equal caches.
        let a = engine();
        a.on_service_added(headless_service("db", "prod"));
        a.on_endpoints_added(endpoints("db", "prod", "10.0.0.7", Some("db-0")));
        a.on_service_added(cluster_ip_service("web", "prod", "10.0.0.5", 80));

        let b = engine();
        b.on_endpoints_added(endpoints("db", "prod", "10.0.0.7", Some("db-0")));
        b.on_service_added(cluster_ip_service("web", "prod", "10.0.0.5", 80));
        b.on_service_added(headless_service("db", "prod"));

        assert_eq!(
            a.store.cache_as_json().unwrap(),
            b.store.cache_as_json().unwrap()
        );
        assert_eq!(
            a.store.lookup_reverse("10.0.0.7").unwrap().host,
            b.store.lookup_reverse("10.0.0.7").unwrap().host
        );
    }
}
