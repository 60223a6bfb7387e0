//! Cluster DNS - an authoritative DNS record engine backed by cluster
//! service and endpoint state.
//!
//! This crate translates the live state of a cluster's service and
//! endpoint inventory into authoritative DNS records (A/AAAA, SRV, PTR,
//! CNAME) and answers forward and reverse queries against that
//! projection. A hickory-server front end serves the records over UDP and
//! TCP.
//!
//! ## Features
//!
//! - Event-driven record updates: service and endpoints events are
//!   reconciled into a hierarchical record cache with atomic per-service
//!   subtree swaps
//! - Record synthesis per service flavor: cluster-IP, headless, and
//!   ExternalName services each project differently
//! - Reverse (PTR) answers for cluster IPs and named headless endpoints
//! - Pod records synthesized from dashed-IP labels without touching the
//!   cache
//! - Federation CNAME redirects for configured federations
//! - Graceful shutdown support
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          cluster-dns                            │
//! │                                                                 │
//! │  ┌──────────────────┐    ┌──────────────────┐                   │
//! │  │ Informer events  │───▶│   DnsEngine      │                   │
//! │  │ (svc/endpoints)  │    │ reconcile ─▶ store                   │
//! │  └──────────────────┘    └────────┬─────────┘                   │
//! │         │                         │                             │
//! │         │ add / update /          ▼                             │
//! │         │ delete             ┌──────────────────┐               │
//! │         │                    │  Hickory DNS     │◀── UDP/TCP    │
//! │         │                    │  Server          │    :53        │
//! │         └───────────────────▶└──────────────────┘               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! web.prod.svc.cluster.local
//!   → reverse the labels into a cache path
//!   → collect the service subtree (A at the node, SRV below it)
//! 5.0.0.10.in-addr.arpa
//!   → extract 10.0.0.5, answer from the reverse index
//! mysvc.myns.myfed.svc.cluster.local
//!   → no local service → CNAME into the federation's parent domain
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use cluster_dns::{DnsEngine, DnsServer, ServerConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Arc::new(DnsEngine::new("cluster.local"));
//!     // ... wire informer callbacks to engine.on_service_added(..) etc.
//!     engine.mark_services_synced();
//!     engine.mark_endpoints_synced();
//!
//!     let config = ServerConfig {
//!         listen_addr: "[::]:5353".parse().unwrap(),
//!         domain: "cluster.local".to_string(),
//!         ttl: 30,
//!         initial_sync_timeout_secs: 60,
//!         soa: Default::default(),
//!         inventory: None,
//!     };
//!
//!     let shutdown = CancellationToken::new();
//!     let server = DnsServer::new(config, engine);
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod reconcile;
pub mod records;
pub mod resolver;
pub mod server;
pub mod store;
pub mod synthesize;
pub mod telemetry;
pub mod treecache;
pub mod util;

// Re-export main types
pub use authority::ClusterAuthority;
pub use config::{
    AppConfig, Config, ConfigHolder, ConfigSource, ServerConfig, SoaConfig, StaticConfigSource,
    TelemetryConfig,
};
pub use engine::DnsEngine;
pub use error::DnsError;
pub use records::RecordValue;
pub use server::DnsServer;
pub use store::RecordStore;
pub use treecache::TreeCache;
