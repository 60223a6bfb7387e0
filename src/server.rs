//! DNS server setup and lifecycle management.

use hickory_proto::rr::{LowerName, Name};
use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::authority::ClusterAuthority;
use crate::config::ServerConfig;
use crate::engine::DnsEngine;
use crate::error::DnsError;

/// Interval for emitting state metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// TCP request timeout for the wire server.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// The IPv4 reverse zone; PTR queries route here.
const REVERSE_ZONE: &str = "in-addr.arpa.";

/// Periodically emit state metrics.
async fn metrics_loop(engine: Arc<DnsEngine>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.emit_metrics();
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Wire-level DNS server fronting the record engine.
pub struct DnsServer {
    config: ServerConfig,
    engine: Arc<DnsEngine>,
}

impl DnsServer {
    /// Create a new DNS server over the given engine.
    pub fn new(config: ServerConfig, engine: Arc<DnsEngine>) -> Self {
        Self { config, engine }
    }

    /// The engine this server queries.
    pub fn engine(&self) -> &Arc<DnsEngine> {
        &self.engine
    }

    /// Run the DNS server until `shutdown` fires. Startup blocks until the
    /// engine reports synced; expiry of the initial sync timeout is fatal.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.config.listen_addr,
            domain = %self.engine.domain(),
            "starting cluster-dns server"
        );

        let timeout = Duration::from_secs(self.config.initial_sync_timeout_secs);
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested before initial sync completed");
                return Ok(());
            }
            result = self.engine.wait_for_sync(timeout) => result?,
        }

        let authority = ClusterAuthority::new(self.config.clone(), self.engine.clone())?;
        let authority: Arc<dyn AuthorityObject> = Arc::new(authority);

        let mut catalog = Catalog::new();
        catalog.upsert(authority.origin().clone(), vec![authority.clone()]);
        // PTR queries arrive under the reverse zone, not the cluster domain.
        catalog.upsert(
            LowerName::from(Name::from_ascii(REVERSE_ZONE)?),
            vec![authority],
        );

        let mut server = ServerFuture::new(catalog);

        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        info!(domain = %self.engine.domain(), "DNS server ready to serve queries");

        let metrics_engine = self.engine.clone();
        let metrics_shutdown = shutdown.clone();
        let metrics_handle = tokio::spawn(async move {
            metrics_loop(metrics_engine, metrics_shutdown).await;
        });

        self.engine.emit_metrics();

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        let _ = metrics_handle.await;

        info!("DNS server stopped");
        Ok(())
    }
}
