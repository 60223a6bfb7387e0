//! End-to-end tests of the record engine through its public surface:
//! informer-shaped events in, structured records out.

use std::collections::HashMap;
use std::sync::Arc;

use cluster_dns::cluster::{
    EndpointAddress, EndpointPort, EndpointSubset, EndpointsSnapshot, NodeSnapshot, ServicePort,
    ServiceSnapshot, StaticNodeList, REGION_LABEL, ZONE_LABEL,
};
use cluster_dns::{Config, DnsEngine, DnsError, RecordValue};

const DOMAIN: &str = "cluster.local";

fn engine() -> DnsEngine {
    DnsEngine::new(DOMAIN)
}

fn service(
    name: &str,
    ns: &str,
    ips: &[&str],
    ports: &[(&str, &str, u16)],
    external_name: Option<&str>,
) -> ServiceSnapshot {
    ServiceSnapshot {
        name: name.to_string(),
        namespace: ns.to_string(),
        cluster_ips: ips.iter().map(|s| s.to_string()).collect(),
        ports: ports
            .iter()
            .map(|(name, protocol, port)| ServicePort {
                name: name.to_string(),
                protocol: protocol.to_string(),
                port: *port,
            })
            .collect(),
        external_name: external_name.map(String::from),
    }
}

fn endpoints(
    name: &str,
    ns: &str,
    addresses: &[(&str, Option<&str>)],
    ports: &[(&str, &str, u16)],
) -> EndpointsSnapshot {
    EndpointsSnapshot {
        name: name.to_string(),
        namespace: ns.to_string(),
        subsets: vec![EndpointSubset {
            addresses: addresses
                .iter()
                .map(|(ip, hostname)| EndpointAddress {
                    ip: ip.to_string(),
                    hostname: hostname.map(String::from),
                })
                .collect(),
            ports: ports
                .iter()
                .map(|(name, protocol, port)| EndpointPort {
                    name: name.to_string(),
                    protocol: protocol.to_string(),
                    port: *port,
                })
                .collect(),
        }],
    }
}

#[test]
fn cluster_ip_service_with_one_port() {
    let engine = engine();
    engine.on_service_added(service(
        "web",
        "prod",
        &["10.0.0.5"],
        &[("http", "TCP", 80)],
        None,
    ));

    let records = engine.records("web.prod.svc.cluster.local.", false).unwrap();
    assert_eq!(records.len(), 2);
    let a = records.iter().find(|r| r.port == 0).unwrap();
    assert_eq!(a.host, "10.0.0.5");
    assert_eq!((a.priority, a.weight, a.ttl), (10, 10, 30));
    let srv = records.iter().find(|r| r.port == 80).unwrap();
    assert_eq!(srv.host, "web.prod.svc.cluster.local");

    let srv_subtree = engine
        .records("_tcp.web.prod.svc.cluster.local.", false)
        .unwrap();
    assert_eq!(srv_subtree.len(), 1);
    assert_eq!(srv_subtree[0].port, 80);

    let ptr = engine.reverse_record("5.0.0.10.in-addr.arpa.").unwrap();
    assert_eq!(ptr.host, "web.prod.svc.cluster.local");
}

#[test]
fn headless_service_with_named_endpoint() {
    let engine = engine();
    engine.on_service_added(service("db", "prod", &[], &[], None));
    engine.on_endpoints_added(endpoints(
        "db",
        "prod",
        &[("10.0.0.7", Some("db-0"))],
        &[("sql", "TCP", 5432)],
    ));

    let exact = engine
        .records("db-0.db.prod.svc.cluster.local.", true)
        .unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].host, "10.0.0.7");
    assert_eq!(exact[0].port, 0);

    let srv = engine
        .records("_tcp.db.prod.svc.cluster.local.", false)
        .unwrap();
    assert_eq!(srv.len(), 1);
    assert_eq!(srv[0].host, "db-0.db.prod.svc.cluster.local");
    assert_eq!(srv[0].port, 5432);

    let ptr = engine.reverse_record("7.0.0.10.in-addr.arpa.").unwrap();
    assert_eq!(ptr.host, "db-0.db.prod.svc.cluster.local");
}

#[test]
fn headless_service_with_hostname_less_endpoint() {
    let engine = engine();
    engine.on_service_added(service("db", "prod", &[], &[], None));
    engine.on_endpoints_added(endpoints(
        "db",
        "prod",
        &[("10.0.0.8", None)],
        &[("sql", "TCP", 5432)],
    ));

    assert!(matches!(
        engine.reverse_record("8.0.0.10.in-addr.arpa."),
        Err(DnsError::NotFound)
    ));

    // The A record is keyed by the FNV hash of its payload.
    let label = RecordValue::new("10.0.0.8", 0).label();
    let exact = engine
        .records(&format!("{label}.db.prod.svc.cluster.local."), true)
        .unwrap();
    assert_eq!(exact[0].host, "10.0.0.8");

    let subtree = engine.records("db.prod.svc.cluster.local.", false).unwrap();
    assert!(subtree.iter().any(|r| r.host == "10.0.0.8" && r.port == 0));
}

#[test]
fn external_name_service() {
    let engine = engine();
    engine.on_service_added(service("alias", "prod", &[], &[], Some("example.com")));

    let records = engine
        .records("alias.prod.svc.cluster.local.", true)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].host, "example.com");
    assert_eq!(records[0].port, 0);
}

#[test]
fn flavor_flip_from_external_name_to_cluster_ip() {
    let engine = engine();
    let old = service("web", "prod", &[], &[], Some("example.com"));
    engine.on_service_added(old.clone());

    let new = service("web", "prod", &["10.0.0.9"], &[("http", "TCP", 80)], None);
    engine.on_service_updated(old, new);

    // The old CNAME is gone.
    assert!(matches!(
        engine.records("web.prod.svc.cluster.local.", true),
        Err(DnsError::NotFound)
    ));

    // A and SRV records exist.
    let records = engine.records("web.prod.svc.cluster.local.", false).unwrap();
    assert!(records.iter().any(|r| r.host == "10.0.0.9" && r.port == 0));
    assert!(records.iter().any(|r| r.port == 80));

    // And the reverse entry resolves.
    let ptr = engine.reverse_record("9.0.0.10.in-addr.arpa.").unwrap();
    assert_eq!(ptr.host, "web.prod.svc.cluster.local");
}

#[test]
fn federation_redirect_without_local_service() {
    let node = NodeSnapshot {
        name: "n1".to_string(),
        labels: HashMap::from([
            (ZONE_LABEL.to_string(), "z1".to_string()),
            (REGION_LABEL.to_string(), "r1".to_string()),
        ]),
    };
    let engine = DnsEngine::new(DOMAIN).with_node_lister(Arc::new(StaticNodeList(vec![node])));
    engine
        .update_config(Config {
            federations: HashMap::from([("myfed".to_string(), "example.com".to_string())]),
            upstream_nameservers: Vec::new(),
        })
        .unwrap();

    let records = engine
        .records("mysvc.ns.myfed.svc.cluster.local.", false)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].host, "mysvc.ns.myfed.svc.z1.r1.example.com.");

    // The exact form of the same name finds nothing.
    assert!(matches!(
        engine.records("mysvc.ns.myfed.svc.cluster.local.", true),
        Err(DnsError::NotFound)
    ));
}

#[test]
fn pod_records_are_synthesized_without_the_cache() {
    let engine = engine();

    let records = engine
        .records("10-0-0-1.default.pod.cluster.local.", false)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].host, "10.0.0.1");
    assert_eq!(records[0].port, 0);

    assert!(matches!(
        engine.records("300-0-0-1.default.pod.cluster.local.", false),
        Err(DnsError::BadRequest(_))
    ));
}

#[test]
fn isomorphic_event_sequences_converge() {
    let sequence_a = |engine: &DnsEngine| {
        engine.on_service_added(service(
            "web",
            "prod",
            &["10.0.0.5"],
            &[("http", "TCP", 80)],
            None,
        ));
        engine.on_service_added(service("db", "prod", &[], &[], None));
        engine.on_endpoints_added(endpoints(
            "db",
            "prod",
            &[("10.0.0.7", Some("db-0"))],
            &[("sql", "TCP", 5432)],
        ));
    };
    let sequence_b = |engine: &DnsEngine| {
        engine.on_endpoints_added(endpoints(
            "db",
            "prod",
            &[("10.0.0.7", Some("db-0"))],
            &[("sql", "TCP", 5432)],
        ));
        engine.on_service_added(service("db", "prod", &[], &[], None));
        // An update that changes nothing still converges.
        let web = service("web", "prod", &["10.0.0.5"], &[("http", "TCP", 80)], None);
        engine.on_service_added(web.clone());
        engine.on_service_updated(web.clone(), web);
    };

    let a = engine();
    sequence_a(&a);
    let b = engine();
    sequence_b(&b);

    assert_eq!(a.cache_as_json().unwrap(), b.cache_as_json().unwrap());
    assert_eq!(
        a.reverse_record("7.0.0.10.in-addr.arpa.").unwrap().host,
        b.reverse_record("7.0.0.10.in-addr.arpa.").unwrap().host
    );
    assert_eq!(
        a.reverse_record("5.0.0.10.in-addr.arpa.").unwrap().host,
        b.reverse_record("5.0.0.10.in-addr.arpa.").unwrap().host
    );
}

#[test]
fn concurrent_readers_never_see_a_torn_service() {
    let engine = Arc::new(engine());

    // Two generations of the same portless service; every query must see
    // one generation's address pair in full.
    let gen_a = service("web", "prod", &["10.0.0.1", "10.0.0.2"], &[], None);
    let gen_b = service("web", "prod", &["10.0.0.8", "10.0.0.9"], &[], None);
    engine.on_service_added(gen_a.clone());

    let writer = {
        let engine = engine.clone();
        let (gen_a, gen_b) = (gen_a.clone(), gen_b.clone());
        std::thread::spawn(move || {
            for i in 0..500 {
                if i % 2 == 0 {
                    engine.on_service_updated(gen_a.clone(), gen_b.clone());
                } else {
                    engine.on_service_updated(gen_b.clone(), gen_a.clone());
                }
            }
        })
    };

    let reader = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            for _ in 0..500 {
                let records = engine.records("web.prod.svc.cluster.local.", false).unwrap();
                let mut hosts: Vec<&str> = records.iter().map(|r| r.host.as_str()).collect();
                hosts.sort_unstable();
                assert!(
                    hosts == ["10.0.0.1", "10.0.0.2"] || hosts == ["10.0.0.8", "10.0.0.9"],
                    "torn read: {hosts:?}"
                );
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn wildcard_and_namespace_subtree_queries() {
    let engine = engine();
    engine.on_service_added(service(
        "web",
        "prod",
        &["10.0.0.5"],
        &[("http", "TCP", 80)],
        None,
    ));
    engine.on_service_added(service("api", "prod", &["10.0.0.6"], &[], None));

    let all = engine.records("*.prod.svc.cluster.local.", false).unwrap();
    assert_eq!(all.len(), 3);

    let ns = engine.records("prod.svc.cluster.local.", false).unwrap();
    assert_eq!(ns.len(), 3);
}

#[test]
fn diagnostic_dump_reflects_the_cache() {
    let engine = engine();
    engine.on_service_added(service(
        "web",
        "prod",
        &["10.0.0.5"],
        &[("http", "TCP", 80)],
        None,
    ));

    let json = engine.cache_as_json().unwrap();
    assert!(json.contains("10.0.0.5"));
    assert!(json.contains("web.prod.svc.cluster.local."));
}
