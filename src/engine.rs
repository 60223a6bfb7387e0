//! The record engine: record store, object stores, and dynamic
//! configuration behind one handle.
//!
//! Event handlers (reconciliation) live in `reconcile`, query entry points
//! in `resolver`, and the federation grammar in `federation`; all of them
//! are `impl DnsEngine` blocks over the state assembled here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{EndpointsSnapshot, NodeLister, NodeSnapshot, ServiceSnapshot, Store};
use crate::config::{Config, ConfigHolder, ConfigSource};
use crate::error::DnsError;
use crate::metrics;
use crate::store::RecordStore;

/// Poll interval for the initial sync gate.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Authoritative DNS record engine for a cluster's service and endpoint
/// inventory.
pub struct DnsEngine {
    /// Domain this engine is authoritative for, without a trailing dot.
    pub(crate) domain: String,

    /// The domain as a reversed label path; `cluster.local` becomes
    /// `["local", "cluster"]`.
    pub(crate) domain_path: Vec<String>,

    pub(crate) store: RecordStore,
    pub(crate) services: Store<ServiceSnapshot>,
    pub(crate) endpoints: Store<EndpointsSnapshot>,

    /// Node cache for zone/region discovery; holds at most the one node
    /// picked on first use.
    pub(crate) nodes: Store<NodeSnapshot>,
    pub(crate) node_lister: Option<Arc<dyn NodeLister>>,

    pub(crate) config: ConfigHolder,

    services_synced: AtomicBool,
    endpoints_synced: AtomicBool,
}

impl DnsEngine {
    /// Creates an engine authoritative for `domain` (trailing dot
    /// tolerated).
    pub fn new(domain: &str) -> Self {
        let domain = domain.trim_end_matches('.').to_string();
        let mut domain_path: Vec<String> = domain.split('.').map(String::from).collect();
        domain_path.reverse();

        Self {
            domain,
            domain_path,
            store: RecordStore::new(),
            services: Store::new(),
            endpoints: Store::new(),
            nodes: Store::new(),
            node_lister: None,
            config: ConfigHolder::new(),
            services_synced: AtomicBool::new(false),
            endpoints_synced: AtomicBool::new(false),
        }
    }

    /// Attaches the one-shot node lister used for zone/region discovery.
    pub fn with_node_lister(mut self, lister: Arc<dyn NodeLister>) -> Self {
        self.node_lister = Some(lister);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Marks the services informer cache as having completed its initial
    /// listing.
    pub fn mark_services_synced(&self) {
        self.services_synced.store(true, Ordering::SeqCst);
    }

    /// Marks the endpoints informer cache as having completed its initial
    /// listing.
    pub fn mark_endpoints_synced(&self) {
        self.endpoints_synced.store(true, Ordering::SeqCst);
    }

    /// True once both informer caches have reported synced.
    pub fn has_synced(&self) -> bool {
        self.services_synced.load(Ordering::SeqCst) && self.endpoints_synced.load(Ordering::SeqCst)
    }

    /// Blocks until `has_synced` or the timeout elapses. A timeout is
    /// fatal to startup.
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<(), DnsError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut interval = tokio::time::interval(SYNC_POLL_INTERVAL);
        loop {
            interval.tick().await;
            if self.has_synced() {
                info!(
                    services = self.services.len(),
                    endpoints = self.endpoints.len(),
                    "initialized services and endpoints"
                );
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DnsError::SyncTimeout(timeout));
            }
            debug!("waiting for services and endpoints to be initialized...");
        }
    }

    /// Installs the dynamic configuration snapshot, rejecting it wholesale
    /// when validation fails.
    pub fn update_config(&self, next: Config) -> Result<(), DnsError> {
        let result = self.config.update(next);
        metrics::record_config_update(result.is_ok());
        result
    }

    /// Runs the initial one-shot configuration fetch. Failure leaves the
    /// defaults installed and is not fatal; a later push can still apply.
    pub fn apply_initial_config(&self, source: &dyn ConfigSource) {
        match source.once() {
            Ok(config) => {
                if let Err(err) = self.update_config(config) {
                    warn!(error = %err, "initial configuration rejected, keeping defaults");
                }
            }
            Err(err) => {
                warn!(error = %err, "initial configuration fetch failed, starting with defaults");
                let _ = self.update_config(Config::default());
            }
        }
    }

    /// Applies configuration snapshots from `updates` until the stream
    /// ends or `shutdown` fires.
    pub async fn sync_config(
        &self,
        mut updates: mpsc::Receiver<Config>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("configuration sync shutting down");
                    return;
                }

                next = updates.recv() => match next {
                    Some(config) => {
                        if let Err(err) = self.update_config(config) {
                            warn!(error = %err, "configuration update rejected");
                        }
                    }
                    None => {
                        debug!("configuration stream ended");
                        return;
                    }
                },
            }
        }
    }

    /// Validated upstream resolvers, as dialable `ip:port` strings, for
    /// the front end's recursion path.
    pub fn upstream_nameservers(&self) -> Vec<String> {
        self.config.nameservers()
    }

    /// Current zone serial, bumped on every record-store mutation.
    pub fn serial(&self) -> u32 {
        self.store.serial()
    }

    /// Diagnostic JSON dump of the tree cache.
    pub fn cache_as_json(&self) -> Result<String, DnsError> {
        Ok(self.store.cache_as_json()?)
    }

    /// Emits current state gauges.
    pub fn emit_metrics(&self) {
        metrics::record_state_counts(
            self.services.len(),
            self.endpoints.len(),
            self.store.reverse_len(),
            self.store.cluster_ip_len(),
        );
        metrics::record_ready_state(
            self.services_synced.load(Ordering::SeqCst),
            self.endpoints_synced.load(Ordering::SeqCst),
        );
        metrics::record_serial(self.store.serial());
    }
}
