//! Configuration types for cluster-dns.
//!
//! Static configuration (listen address, authoritative domain, SOA,
//! telemetry) is loaded once at startup from TOML plus environment
//! overrides. The dynamic snapshot (`Config`) carries the federation map
//! and upstream nameservers and is replaced atomically whenever the
//! configuration subsystem pushes an update.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::DnsError;
use crate::util::{join_host_port, validate_nameserver};

/// Host resolver configuration consulted when upstream nameserver
/// validation falls back.
const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

/// Top-level static configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// DNS server configuration.
    pub server: ServerConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Initial dynamic configuration snapshot.
    #[serde(default)]
    pub dynamic: Config,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address for the DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Authoritative domain (e.g., "cluster.local").
    pub domain: String,

    /// TTL for apex (SOA/NS) records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Startup fails if the informer caches have not synced within this
    /// many seconds.
    #[serde(default = "default_sync_timeout")]
    pub initial_sync_timeout_secs: u64,

    /// SOA record configuration.
    #[serde(default)]
    pub soa: SoaConfig,

    /// Optional static inventory file (services, endpoints, nodes) to
    /// replay at startup in place of a live informer feed.
    #[serde(default)]
    pub inventory: Option<PathBuf>,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "cluster_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

/// SOA (Start of Authority) record configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoaConfig {
    /// Primary nameserver hostname.
    pub mname: String,

    /// Admin email in DNS format.
    pub rname: String,

    #[serde(default = "default_refresh")]
    pub refresh: u32,

    #[serde(default = "default_retry")]
    pub retry: u32,

    #[serde(default = "default_expire")]
    pub expire: u32,

    #[serde(default = "default_minimum")]
    pub minimum: u32,
}

impl Default for SoaConfig {
    fn default() -> Self {
        Self {
            mname: "ns.dns.cluster.local".to_string(),
            rname: "hostmaster.cluster.local".to_string(),
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            minimum: default_minimum(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ttl() -> u32 {
    30
}

fn default_sync_timeout() -> u64 {
    60
}

fn default_refresh() -> u32 {
    3600
}

fn default_retry() -> u32 {
    600
}

fn default_expire() -> u32 {
    86400
}

fn default_minimum() -> u32 {
    30
}

/// Dynamic configuration snapshot pushed by the configuration subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Federation name -> federation parent domain.
    #[serde(default)]
    pub federations: HashMap<String, String>,

    /// Upstream recursive resolvers, each `ip` or `ip:port`.
    #[serde(default)]
    pub upstream_nameservers: Vec<String>,
}

/// Source of dynamic configuration snapshots. The initial fetch is
/// synchronous; later snapshots arrive over a channel (see
/// `DnsEngine::sync_config`).
pub trait ConfigSource: Send + Sync {
    /// Fetches the initial snapshot synchronously.
    fn once(&self) -> Result<Config, DnsError>;
}

/// A fixed snapshot, for tests and file-seeded deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource(pub Config);

impl ConfigSource for StaticConfigSource {
    fn once(&self) -> Result<Config, DnsError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Default)]
struct ConfigState {
    config: Arc<Config>,
    nameservers: Vec<String>,
}

/// Atomically replaceable dynamic configuration, guarded by its own lock
/// (queries read it while the cache lock is held; the two never nest the
/// other way).
#[derive(Debug, Default)]
pub struct ConfigHolder {
    inner: RwLock<ConfigState>,
}

impl ConfigHolder {
    /// Creates a holder with the default (empty) snapshot installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot.
    pub fn get(&self) -> Arc<Config> {
        self.inner.read().config.clone()
    }

    /// Validated upstream nameservers as dialable `ip:port` strings.
    pub fn nameservers(&self) -> Vec<String> {
        self.inner.read().nameservers.clone()
    }

    /// Validates and installs `next`. An invalid nameserver rejects the
    /// whole update, keeping the previous snapshot; on initial load only,
    /// rejection installs the host's resolv.conf nameservers so the front
    /// end still has a recursion path. An empty (but valid) nameserver
    /// list also falls back to resolv.conf.
    pub fn update(&self, next: Config) -> Result<(), DnsError> {
        let mut validated = Vec::with_capacity(next.upstream_nameservers.len());
        for nameserver in &next.upstream_nameservers {
            match validate_nameserver(nameserver) {
                Ok((ip, port)) => validated.push(join_host_port(&ip, &port)),
                Err(err) => {
                    warn!(nameserver = %nameserver, error = %err, "invalid nameserver, rejecting configuration update");
                    let mut state = self.inner.write();
                    if state.nameservers.is_empty() {
                        state.nameservers = host_nameservers(RESOLV_CONF_PATH);
                    }
                    return Err(DnsError::Config(format!(
                        "invalid nameserver {nameserver:?}"
                    )));
                }
            }
        }

        let mut state = self.inner.write();
        state.nameservers = if validated.is_empty() {
            host_nameservers(RESOLV_CONF_PATH)
        } else {
            validated
        };
        state.config = Arc::new(next);
        info!(
            federations = state.config.federations.len(),
            nameservers = state.nameservers.len(),
            "configuration updated"
        );
        Ok(())
    }
}

/// Nameservers from the host's resolver configuration, with the default
/// DNS port. Unreadable or unparsable files yield an empty list.
fn host_nameservers(path: &str) -> Vec<String> {
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path, error = %err, "failed to read resolver configuration");
            return Vec::new();
        }
    };
    match resolv_conf::Config::parse(&contents) {
        Ok(parsed) => parsed
            .nameservers
            .iter()
            .map(|ip| join_host_port(&ip.to_string(), "53"))
            .collect(),
        Err(err) => {
            warn!(path, error = %err, "failed to parse resolver configuration");
            Vec::new()
        }
    }
}
