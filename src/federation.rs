//! Federated-query classification and redirect CNAME synthesis.
//!
//! A federation query names a service through a configured federation:
//! `mysvc.myns.myfed.svc.cluster.local`. When no local service answers,
//! the query is redirected into the federation's parent domain, qualified
//! by the cluster's zone and region labels.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::cluster::ObjectKey;
use crate::engine::DnsEngine;
use crate::error::DnsError;
use crate::records::RecordValue;
use crate::synthesize::SERVICE_SUBDOMAIN;
use crate::util::{is_rfc1035_label, is_rfc1123_label, is_rfc1123_subdomain};

impl DnsEngine {
    /// Tests whether `segments` (the queried name's labels in name order)
    /// matches the federated service query pattern. All of the following
    /// must hold: the name has exactly 4 + domain labels; the service name
    /// is an RFC 1035 label; the namespace and federation name are RFC
    /// 1123 labels; the fourth label is `svc`; the trailing labels spell
    /// the authoritative domain; and the federation is configured. A
    /// wildcard query never matches.
    pub(crate) fn is_federation_query(&self, segments: &[&str]) -> bool {
        if segments.len() != self.domain_path.len() + 4 {
            trace!(?segments, "not a federation query: wrong label count");
            return false;
        }
        if !is_rfc1035_label(segments[0]) {
            trace!(label = segments[0], "not a federation query: bad service label");
            return false;
        }
        if !is_rfc1123_label(segments[1]) || !is_rfc1123_label(segments[2]) {
            trace!(?segments, "not a federation query: bad namespace or federation label");
            return false;
        }
        if segments[3] != SERVICE_SUBDOMAIN {
            trace!(label = segments[3], "not a federation query: fourth label is not svc");
            return false;
        }
        for (i, component) in self.domain_path.iter().enumerate() {
            // domain_path is reversed, so compare against the name tail in
            // reverse order.
            if component != segments[segments.len() - i - 1] {
                trace!(?segments, "not a federation query: domain mismatch");
                return false;
            }
        }
        if !self.config.get().federations.contains_key(segments[2]) {
            trace!(federation = segments[2], "not a federation query: unknown federation");
            return false;
        }
        true
    }

    /// Synthesizes the redirect CNAME for a federation-classified name:
    /// the authoritative domain tail is replaced by the cluster's zone and
    /// region plus the federation's configured parent domain.
    pub(crate) fn federation_records(
        &self,
        segments: &[String],
    ) -> Result<Vec<Arc<RecordValue>>, DnsError> {
        let borrowed: Vec<&str> = segments.iter().map(String::as_str).collect();
        if !self.is_federation_query(&borrowed) {
            return Err(DnsError::NotFound);
        }

        let mut parts: Vec<String> =
            segments[..segments.len() - self.domain_path.len()].to_vec();
        let federation = parts[2].clone();

        let (zone, region) = self.cluster_zone_and_region()?;
        parts.push(zone);
        parts.push(region);

        let config = self.config.get();
        let Some(domain) = config.federations.get(&federation) else {
            // Classification just saw it; a concurrent config swap removed it.
            return Err(DnsError::NotFound);
        };
        if !is_rfc1123_subdomain(domain) {
            warn!(federation = %federation, domain = %domain, "federation domain is not a valid subdomain");
            return Err(DnsError::Transient(format!(
                "invalid domain {domain:?} for federation {federation:?}"
            )));
        }

        let mut name = parts.join(".");
        name.push('.');
        name.push_str(domain);
        if !name.ends_with('.') {
            name.push('.');
        }
        debug!(name = %name, "synthesized federation redirect");
        Ok(vec![Arc::new(RecordValue::new(name, 0))])
    }

    /// The zone and region labels of an arbitrarily selected cluster node.
    /// The first node found carrying both labels is cached and never
    /// re-evaluated, even if it later leaves the cluster.
    pub(crate) fn cluster_zone_and_region(&self) -> Result<(String, String), DnsError> {
        if let Some(node) = self.nodes.list().into_iter().next() {
            return node.zone_and_region().ok_or_else(|| {
                DnsError::Transient(format!("cached node {:?} lacks zone/region labels", node.name))
            });
        }

        let lister = self
            .node_lister
            .as_ref()
            .ok_or_else(|| DnsError::Transient("no node source configured".to_string()))?;
        let nodes = lister.list_nodes()?;
        if nodes.is_empty() {
            return Err(DnsError::Transient("cluster has no nodes".to_string()));
        }
        for node in nodes {
            if let Some((zone, region)) = node.zone_and_region() {
                self.nodes.insert(ObjectKey::new("", &node.name), node);
                return Ok((zone, region));
            }
        }
        Err(DnsError::Transient(
            "no node carries zone and region labels".to_string(),
        ))
    }
}
