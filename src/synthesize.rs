//! Pure record synthesis: converting a service (plus, for headless
//! services, its endpoints) into a staged cache subtree and reverse-index
//! deltas. Nothing here touches shared state; the reconciler installs the
//! staged output under the record-store lock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::{EndpointsSnapshot, ServiceSnapshot};
use crate::records::RecordValue;
use crate::treecache::TreeCache;

/// Subdomain under the authoritative domain for all services.
pub const SERVICE_SUBDOMAIN: &str = "svc";

/// Subdomain under the authoritative domain for all pods.
pub const POD_SUBDOMAIN: &str = "pod";

/// Cache writes staged for one service: the subtree to swap in at the
/// service's name label, and the reverse-index entries to install.
#[derive(Debug, Default)]
pub struct StagedService {
    /// Records rooted at the service's name label.
    pub subtree: TreeCache,
    /// IP to PTR payload pairs for the reverse index.
    pub reverse: Vec<(String, Arc<RecordValue>)>,
}

/// The service's DNS name, `web.prod.svc.cluster.local`, not fully
/// qualified. Address payloads in the reverse index and SRV targets use
/// this form.
pub fn service_fqdn(svc: &ServiceSnapshot, domain: &str) -> String {
    format!(
        "{}.{}.{}.{}",
        svc.name, svc.namespace, SERVICE_SUBDOMAIN, domain
    )
}

/// Fully qualified name of a record under the service, with `prefix`
/// labels (leftmost first) ahead of the service name. Carried with cache
/// entries for diagnostics.
fn entry_fqdn(svc: &ServiceSnapshot, domain: &str, prefix: &[&str]) -> String {
    let mut name = String::new();
    for label in prefix {
        name.push_str(label);
        name.push('.');
    }
    name.push_str(&service_fqdn(svc, domain));
    name.push('.');
    name
}

fn srv_labels(protocol: &str, port_name: &str) -> (String, String) {
    (
        format!("_{}", protocol.to_lowercase()),
        format!("_{}", port_name),
    )
}

/// Records for a cluster-IP service: one A leaf per cluster IP, SRV leaves
/// for every named port, and a PTR entry per cluster IP pointing at the
/// service name.
pub fn portal_records(svc: &ServiceSnapshot, domain: &str) -> StagedService {
    let mut staged = StagedService::default();
    let host = service_fqdn(svc, domain);

    for ip in svc.cluster_ips() {
        let record = Arc::new(RecordValue::new(ip, 0));
        let label = record.label();
        staged
            .subtree
            .set_entry(&label, record, &entry_fqdn(svc, domain, &[&label]), &[]);

        for port in &svc.ports {
            if port.name.is_empty() || port.protocol.is_empty() {
                continue;
            }
            let srv = Arc::new(RecordValue::new(host.clone(), port.port));
            let (proto, pname) = srv_labels(&port.protocol, &port.name);
            staged.subtree.set_entry(
                &label,
                srv,
                &entry_fqdn(svc, domain, &[&label, &pname, &proto]),
                &[&proto, &pname],
            );
        }
    }

    let reverse_value = Arc::new(RecordValue::new(host, 0));
    for ip in svc.cluster_ips() {
        staged.reverse.push((ip.to_string(), reverse_value.clone()));
    }
    staged
}

/// Records for a headless service, projected from individual endpoint
/// addresses. Addresses with a hostname are named by it and get a PTR
/// entry; the rest are named by the hash label of their address payload
/// and stay out of the reverse index.
pub fn headless_records(
    svc: &ServiceSnapshot,
    endpoints: &EndpointsSnapshot,
    domain: &str,
) -> StagedService {
    let mut staged = StagedService::default();
    let mut reverse: HashMap<String, Arc<RecordValue>> = HashMap::new();

    for subset in &endpoints.subsets {
        for address in &subset.addresses {
            let record = Arc::new(RecordValue::new(&address.ip, 0));
            let endpoint_name = match address.hostname() {
                Some(hostname) => hostname.to_string(),
                None => record.label(),
            };
            staged.subtree.set_entry(
                &endpoint_name,
                record,
                &entry_fqdn(svc, domain, &[&endpoint_name]),
                &[],
            );

            let target = format!("{}.{}", endpoint_name, service_fqdn(svc, domain));
            for port in &subset.ports {
                if port.name.is_empty() || port.protocol.is_empty() {
                    continue;
                }
                let srv = Arc::new(RecordValue::new(target.clone(), port.port));
                let (proto, pname) = srv_labels(&port.protocol, &port.name);
                staged.subtree.set_entry(
                    &endpoint_name,
                    srv,
                    &entry_fqdn(svc, domain, &[&endpoint_name, &pname, &proto]),
                    &[&proto, &pname],
                );
            }

            if address.hostname().is_some() {
                reverse.insert(address.ip.clone(), Arc::new(RecordValue::new(target, 0)));
            }
        }
    }

    staged.reverse = reverse.into_iter().collect();
    staged
}

/// The single CNAME payload for an ExternalName service, stored as a leaf
/// of the namespace node keyed by the service name. Returns the leaf key,
/// the payload, and the diagnostic FQDN.
pub fn external_name_record(
    svc: &ServiceSnapshot,
    domain: &str,
) -> Option<(String, Arc<RecordValue>, String)> {
    let external = svc.external_name.as_deref()?;
    let record = Arc::new(RecordValue::new(external, 0));
    Some((svc.name.clone(), record, entry_fqdn(svc, domain, &[])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{EndpointAddress, EndpointPort, EndpointSubset, ServicePort};

    const DOMAIN: &str = "cluster.local";

    fn web_service() -> ServiceSnapshot {
        ServiceSnapshot {
            name: "web".to_string(),
            namespace: "prod".to_string(),
            cluster_ips: vec!["10.0.0.5".to_string()],
            ports: vec![ServicePort {
                name: "http".to_string(),
                protocol: "TCP".to_string(),
                port: 80,
            }],
            external_name: None,
        }
    }

    #[test]
    fn portal_service_emits_a_srv_and_reverse() {
        let staged = portal_records(&web_service(), DOMAIN);

        let all = staged.subtree.get_values_for_path_with_wildcards(&[]);
        assert_eq!(all.len(), 2);

        let a = all.iter().find(|r| r.port == 0).unwrap();
        assert_eq!(a.host, "10.0.0.5");

        let srv = all.iter().find(|r| r.port == 80).unwrap();
        assert_eq!(srv.host, "web.prod.svc.cluster.local");

        // SRV leaves live under _protocol/_portname, keyed by the A label.
        let label = RecordValue::new("10.0.0.5", 0).label();
        assert!(staged.subtree.get_entry(&label, &["_tcp", "_http"]).is_some());

        assert_eq!(staged.reverse.len(), 1);
        assert_eq!(staged.reverse[0].0, "10.0.0.5");
        assert_eq!(staged.reverse[0].1.host, "web.prod.svc.cluster.local");
    }

    #[test]
    fn portal_service_skips_unnamed_ports() {
        let mut svc = web_service();
        svc.ports.push(ServicePort {
            name: String::new(),
            protocol: "TCP".to_string(),
            port: 443,
        });
        svc.ports.push(ServicePort {
            name: "metrics".to_string(),
            protocol: String::new(),
            port: 9090,
        });

        let staged = portal_records(&svc, DOMAIN);
        let all = staged.subtree.get_values_for_path_with_wildcards(&[]);
        // One A plus the single well-formed SRV.
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn portal_service_multiple_cluster_ips() {
        let mut svc = web_service();
        svc.cluster_ips.push("10.0.0.6".to_string());

        let staged = portal_records(&svc, DOMAIN);
        let addresses: Vec<_> = staged
            .subtree
            .get_values_for_path_with_wildcards(&[])
            .into_iter()
            .filter(|r| r.port == 0)
            .collect();
        assert_eq!(addresses.len(), 2);
        assert_eq!(staged.reverse.len(), 2);
    }

    fn db_service() -> ServiceSnapshot {
        ServiceSnapshot {
            name: "db".to_string(),
            namespace: "prod".to_string(),
            cluster_ips: Vec::new(),
            ports: Vec::new(),
            external_name: None,
        }
    }

    fn db_endpoints(hostname: Option<&str>) -> EndpointsSnapshot {
        EndpointsSnapshot {
            name: "db".to_string(),
            namespace: "prod".to_string(),
            subsets: vec![EndpointSubset {
                addresses: vec![EndpointAddress {
                    ip: "10.0.0.7".to_string(),
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
    fn headless_named_endpoint() {
        let staged = headless_records(&db_service(), &db_endpoints(Some("db-0")), DOMAIN);

        let a = staged.subtree.get_entry("db-0", &[]).unwrap();
        assert_eq!(a.host, "10.0.0.7");
        assert_eq!(a.port, 0);

        let srv = staged.subtree.get_entry("db-0", &["_tcp", "_sql"]).unwrap();
        assert_eq!(srv.host, "db-0.db.prod.svc.cluster.local");
        assert_eq!(srv.port, 5432);

        assert_eq!(staged.reverse.len(), 1);
        assert_eq!(staged.reverse[0].0, "10.0.0.7");
        assert_eq!(staged.reverse[0].1.host, "db-0.db.prod.svc.cluster.local");
    }

    #[test]
    fn headless_hostname_less_endpoint_has_no_reverse() {
        let staged = headless_records(&db_service(), &db_endpoints(None), DOMAIN);

        // A record keyed by the hash label of the address payload.
        let label = RecordValue::new("10.0.0.7", 0).label();
        let a = staged.subtree.get_entry(&label, &[]).unwrap();
        assert_eq!(a.host, "10.0.0.7");

        assert!(staged.reverse.is_empty());
    }

    #[test]
    fn external_name_cname() {
        let svc = ServiceSnapshot {
            name: "alias".to_string(),
            namespace: "prod".to_string(),
            cluster_ips: Vec::new(),
            ports: Vec::new(),
            external_name: Some("example.com".to_string()),
        };

        let (key, record, fqdn) = external_name_record(&svc, DOMAIN).unwrap();
        assert_eq!(key, "alias");
        assert_eq!(record.host, "example.com");
        assert_eq!(record.port, 0);
        assert_eq!(fqdn, "alias.prod.svc.cluster.local.");
    }
}
