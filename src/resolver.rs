//! Query entry points: forward lookups (with pod-record synthesis and the
//! federation fallback) and reverse lookups.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cluster::ServiceSnapshot;
use crate::engine::DnsEngine;
use crate::error::DnsError;
use crate::records::RecordValue;
use crate::synthesize::POD_SUBDOMAIN;
use crate::treecache::WILDCARD;
use crate::util::{extract_ip, pod_label_ip};

impl DnsEngine {
    /// Responds with the records matching `name`. With `exact`, a single
    /// record stored under exactly that name is returned; otherwise all
    /// records in the subtree matching the name, with `"*"` labels
    /// descending into every child.
    pub fn records(&self, name: &str, exact: bool) -> Result<Vec<Arc<RecordValue>>, DnsError> {
        debug!(name, exact, "forward query");

        let trimmed = name.trim_end_matches('.');
        let mut segments: Vec<&str> = trimmed.split('.').collect();
        let mut federation_segments: Vec<String> = Vec::new();
        let mut federated = false;

        if !exact && self.is_federation_query(&segments) {
            debug!(name, "federation query, trying the local service first");
            federated = true;
            federation_segments = segments.iter().map(|s| s.to_string()).collect();
            // Strip the federation name (third label) to address the local
            // service.
            segments.remove(2);
        }

        let path: Vec<&str> = segments.iter().rev().copied().collect();
        let result = (|| {
            let records = self.records_for_path(&path, exact)?;
            if federated {
                return self.records_for_federation(records, &path, exact, &federation_segments);
            }
            if !records.is_empty() {
                return Ok(records);
            }
            debug!(name, "no records found");
            Err(DnsError::NotFound)
        })();

        match result {
            Err(DnsError::Transient(cause)) => {
                warn!(name, cause = %cause, "query failed on a downstream lookup");
                Err(DnsError::NotFound)
            }
            other => other,
        }
    }

    /// Performs a reverse (PTR) lookup for a name in the IPv4 reverse
    /// form `d.c.b.a.in-addr.arpa.`.
    pub fn reverse_record(&self, name: &str) -> Result<Arc<RecordValue>, DnsError> {
        debug!(name, "reverse query");
        let ip = extract_ip(name)
            .ok_or_else(|| DnsError::BadRequest(format!("unsupported reverse name {name:?}")))?;
        self.store.lookup_reverse(&ip).ok_or(DnsError::NotFound)
    }

    fn records_for_path(
        &self,
        path: &[&str],
        exact: bool,
    ) -> Result<Vec<Arc<RecordValue>>, DnsError> {
        if self.is_pod_record(path) {
            let label = path[path.len() - 1];
            let ip = pod_label_ip(label).ok_or_else(|| {
                DnsError::BadRequest(format!("invalid pod IP label {label:?}"))
            })?;
            return Ok(vec![Arc::new(RecordValue::new(ip, 0))]);
        }

        if exact {
            let key = path[path.len() - 1];
            if key.is_empty() {
                return Ok(Vec::new());
            }
            return match self.store.get_entry(key, &path[..path.len() - 1]) {
                Some(record) => Ok(vec![record]),
                None => Err(DnsError::NotFound),
            };
        }

        Ok(self.store.get_values_for_path_with_wildcards(path))
    }

    /// The federation branch: a local service with usable endpoints wins
    /// and answers with a CNAME to its own local name; otherwise a
    /// redirect CNAME into the federation's parent domain is synthesized.
    fn records_for_federation(
        &self,
        records: Vec<Arc<RecordValue>>,
        path: &[&str],
        exact: bool,
        federation_segments: &[String],
    ) -> Result<Vec<Arc<RecordValue>>, DnsError> {
        let valid = self
            .store
            .has_local_federation_target(&records, |svc| self.service_has_endpoints(svc));

        if valid {
            let mut name = path
                .iter()
                .rev()
                .copied()
                .collect::<Vec<&str>>()
                .join(".");
            if !name.ends_with('.') {
                name.push('.');
            }
            debug!(name = %name, "federation query answered by the local service");
            return Ok(vec![Arc::new(RecordValue::new(name, 0))]);
        }

        if !exact {
            debug!("no local service, trying a federation redirect");
            return self.federation_records(federation_segments);
        }

        Err(DnsError::NotFound)
    }

    /// Whether the endpoints snapshot of `svc` has at least one subset.
    fn service_has_endpoints(&self, svc: &ServiceSnapshot) -> Result<bool, DnsError> {
        Ok(self
            .endpoints
            .get(&svc.key())
            .is_some_and(|endpoints| !endpoints.subsets.is_empty()))
    }

    /// Pod records live at `[domain_path.., "pod", namespace, dashed-ip]`;
    /// wildcard labels never match.
    fn is_pod_record(&self, path: &[&str]) -> bool {
        path.len() == self.domain_path.len() + 3
            && path[self.domain_path.len()] == POD_SUBDOMAIN
            && !path.contains(&WILDCARD)
    }
}
