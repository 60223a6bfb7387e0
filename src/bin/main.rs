//! cluster-dns binary entry point.

use clap::Parser;
use cluster_dns::cluster::{EndpointsSnapshot, NodeSnapshot, ServiceSnapshot, StaticNodeList};
use cluster_dns::{telemetry, AppConfig, DnsEngine, DnsServer, StaticConfigSource};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Authoritative DNS server backed by cluster service and endpoint state.
#[derive(Parser, Debug)]
#[command(name = "cluster-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "cluster-dns.toml")]
    config: PathBuf,
}

/// Static inventory replayed through the event handlers at startup, in
/// place of a live informer feed.
#[derive(Debug, Default, Deserialize)]
struct Inventory {
    #[serde(default)]
    services: Vec<ServiceSnapshot>,
    #[serde(default)]
    endpoints: Vec<EndpointsSnapshot>,
    #[serde(default)]
    nodes: Vec<NodeSnapshot>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: AppConfig = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("CLUSTER_DNS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.server.listen_addr,
        domain = %config.server.domain,
        "starting cluster-dns"
    );

    let inventory: Option<Inventory> = match &config.server.inventory {
        Some(path) => Some(serde_json::from_slice(&std::fs::read(path)?)?),
        None => None,
    };

    let mut engine = DnsEngine::new(&config.server.domain);
    if let Some(inventory) = &inventory {
        if !inventory.nodes.is_empty() {
            engine = engine.with_node_lister(Arc::new(StaticNodeList(inventory.nodes.clone())));
        }
    }
    let engine = Arc::new(engine);

    engine.apply_initial_config(&StaticConfigSource(config.dynamic.clone()));

    match inventory {
        Some(inventory) => {
            let (services, endpoints) = (inventory.services.len(), inventory.endpoints.len());
            for svc in inventory.services {
                engine.on_service_added(svc);
            }
            for eps in inventory.endpoints {
                engine.on_endpoints_added(eps);
            }
            engine.mark_services_synced();
            engine.mark_endpoints_synced();
            info!(services, endpoints, "replayed static inventory");
        }
        None => {
            warn!("no inventory file configured; waiting on an external feed to sync");
        }
    }

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let server = DnsServer::new(config.server.clone(), engine);
    let result = server.run(shutdown).await;

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("cluster-dns shutdown complete");
    Ok(())
}
